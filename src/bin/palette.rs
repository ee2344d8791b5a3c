//! Palette terminal client
//!
//! Line-oriented front end for the Palette server. Commands:
//! - `/attach <path>` picks an image to send with the next message
//! - `/detach` drops the picked image
//! - `/quit` exits
//!
//! Anything else is submitted. Start a line with `image:` to generate an image.

use std::path::PathBuf;

use anyhow::Context;
use tokio::io::{AsyncBufReadExt, BufReader};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use palette_chat::config::ClientConfig;
use palette_chat::conversation::{Attachment, GeneratedAsset};
use palette_chat::session::{DispatchError, Dispatcher, HttpBackend, ImageHistoryPolicy, Renderer};

const ATTACH_USAGE: &str = "usage: /attach <path>";

/// One line of terminal input
#[derive(Debug, PartialEq, Eq)]
enum Command<'a> {
    Quit,
    Detach,
    Attach(&'a str),
    /// `/attach` without a path
    AttachUsage,
    Submit(&'a str),
}

impl<'a> Command<'a> {
    fn parse(line: &'a str) -> Self {
        let input = line.trim_end();
        match input {
            "/quit" => return Command::Quit,
            "/detach" => return Command::Detach,
            _ => {}
        }

        match input.strip_prefix("/attach") {
            Some("") => Command::AttachUsage,
            Some(rest) if rest.starts_with(char::is_whitespace) => Command::Attach(rest.trim()),
            _ => Command::Submit(input),
        }
    }
}

struct TerminalRenderer {
    output_dir: PathBuf,
}

impl TerminalRenderer {
    fn save(&self, asset: &GeneratedAsset) -> anyhow::Result<PathBuf> {
        let bytes = asset.decode().context("image is not valid base64")?;
        std::fs::create_dir_all(&self.output_dir)?;
        let name = format!("palette-{}.png", chrono::Local::now().format("%Y%m%d-%H%M%S%3f"));
        let path = self.output_dir.join(name);
        std::fs::write(&path, bytes)?;
        Ok(path)
    }
}

impl Renderer for TerminalRenderer {
    fn user_text(&mut self, text: &str) {
        println!("me: {}", text);
    }

    fn user_image(&mut self, data_uri: &str) {
        println!("me: [image, {} KiB]", data_uri.len() / 1024);
    }

    fn attachment_preview(&mut self, attachment: &Attachment) {
        println!(
            "(attached {}, {} KiB; it will be sent with your next message)",
            attachment.mime_type,
            attachment.base64.len() * 3 / 4 / 1024
        );
    }

    fn clear_attachment(&mut self) {}

    fn assistant_reply(&mut self, content: &str) {
        println!("assistant:\n{}\n", content);
    }

    fn generated_image(&mut self, prompt: &str, asset: &GeneratedAsset) {
        match self.save(asset) {
            Ok(path) => println!("image for {:?} saved to {}\n", prompt, path.display()),
            Err(e) => eprintln!("! could not save generated image: {:#}", e),
        }
    }

    fn failure(&mut self, notice: &str) {
        eprintln!("! {}\n", notice);
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();

    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "palette_chat=warn".into()),
        )
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .init();

    let config = ClientConfig::from_env();
    let policy = if config.record_images {
        ImageHistoryPolicy::Record
    } else {
        ImageHistoryPolicy::Discard
    };

    let renderer = TerminalRenderer {
        output_dir: config.output_dir.clone(),
    };
    let mut dispatcher = Dispatcher::new(
        HttpBackend::new(config.server_url.clone()),
        renderer,
        config.system_prompt.clone(),
    )
    .with_image_policy(policy);

    println!("Connected to {}. Type /quit to exit.", config.server_url);

    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    while let Some(line) = lines.next_line().await? {
        match Command::parse(&line) {
            Command::Quit => break,
            Command::Detach => dispatcher.detach(),
            Command::AttachUsage => eprintln!("! {}", ATTACH_USAGE),
            Command::Attach(path) => match tokio::fs::read(path).await {
                Ok(bytes) => dispatcher.attach(Attachment::from_bytes(&bytes)),
                Err(e) => eprintln!("! could not read {}: {}", path, e),
            },
            Command::Submit(input) => {
                if let Err(DispatchError::EmptyInput) = dispatcher.submit(input).await {
                    tracing::debug!("Ignoring empty input");
                }
            }
        }
    }

    tracing::debug!("Session ended after {} message(s)", dispatcher.history().len());

    Ok(())
}
