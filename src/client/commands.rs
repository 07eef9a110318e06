//! Command handlers for the client subcommands.

use std::fs;
use std::io::{Read, Write};
use std::path::PathBuf;

use base64::Engine;
use base64::prelude::BASE64_STANDARD;

use crate::config::{Command, ExpandArgs, ExtractArgs, RenderArgs, ShortenArgs};
use crate::domain::diagram::{Diagram, Format};
use crate::infra::http::models::{
    ExpandRequest, ExpandResponse, ExtractResponse, RenderRequest, RenderResponse, ShortenRequest,
    ShortenResponse,
};

use super::{CliError, Ctx};

pub async fn run(command: Command, addr: Option<&str>) -> Result<(), CliError> {
    let addr = addr.ok_or(CliError::MissingAddr)?;
    let ctx = Ctx::new(addr)?;

    match command {
        Command::Shorten(args) => shorten(&ctx, args).await,
        Command::Expand(args) => expand(&ctx, args).await,
        Command::Render(args) => render(&ctx, args).await,
        Command::Extract(args) => extract(&ctx, args).await,
        Command::Daemon(_) => unreachable!("daemon is dispatched before client commands"),
    }
}

async fn shorten(ctx: &Ctx, args: ShortenArgs) -> Result<(), CliError> {
    let source = read_file_or_stdin(args.file)?;
    let response: ShortenResponse = ctx
        .post_json("/api/v1/shorten", &ShortenRequest { source })
        .await?;
    print!("{}", response.encoded);
    Ok(())
}

async fn expand(ctx: &Ctx, args: ExpandArgs) -> Result<(), CliError> {
    let encoded = match args.shortcode {
        Some(shortcode) => shortcode,
        None => read_stdin_string()?,
    };
    let response: ExpandResponse = ctx
        .post_json("/api/v1/expand", &ExpandRequest { encoded })
        .await?;
    print!("{}", response.source);
    Ok(())
}

async fn render(ctx: &Ctx, args: RenderArgs) -> Result<(), CliError> {
    let mut diagram = Diagram::default();
    match args.input {
        Some(input) => match fs::metadata(&input) {
            Ok(meta) if meta.is_dir() => {
                return Err(CliError::InvalidInput(format!(
                    "cannot pass a directory: {input}"
                )));
            }
            Ok(_) => {
                diagram.source = fs::read_to_string(&input).map_err(|source| {
                    CliError::InputFile {
                        path: input.clone(),
                        source,
                    }
                })?;
            }
            // Not a readable file, so assume a shortcode.
            Err(_) => diagram.encoded = input,
        },
        None => {
            let content = read_stdin_string()?;
            if content.contains("@start") && content.contains("@end") {
                diagram.source = content;
            } else {
                diagram.encoded = content;
            }
        }
    }

    let format = Format::parse(&args.format)
        .ok_or_else(|| CliError::InvalidInput(format!("invalid format type: {}", args.format)))?;

    let response: RenderResponse = ctx
        .post_json("/api/v1/render", &RenderRequest { diagram, format })
        .await?;

    let mut stdout = std::io::stdout().lock();
    for (num, encoded) in response.data.iter().enumerate() {
        let image = BASE64_STANDARD.decode(encoded)?;
        if args.output_to_disk {
            let path = format!("{}-{}.{}", args.output_name, num, format.extension());
            fs::write(&path, &image).map_err(CliError::Output)?;
        } else {
            if num > 0 {
                stdout
                    .write_all(args.sep.as_bytes())
                    .map_err(CliError::Output)?;
            }
            stdout.write_all(&image).map_err(CliError::Output)?;
        }
    }
    Ok(())
}

async fn extract(ctx: &Ctx, args: ExtractArgs) -> Result<(), CliError> {
    let data = if args.file == "-" {
        read_stdin_bytes()?
    } else {
        fs::read(&args.file).map_err(|source| CliError::InputFile {
            path: args.file.clone(),
            source,
        })?
    };

    let response: ExtractResponse = ctx
        .post_bytes(
            "/api/v1/extract",
            &[("expand_macros", args.expand_macros.to_string())],
            data,
        )
        .await?;

    if args.short {
        print!("{}", response.diagram.encoded);
    } else {
        print!("{}", response.diagram.source);
    }
    Ok(())
}

fn read_file_or_stdin(file: Option<PathBuf>) -> Result<String, CliError> {
    match file {
        Some(path) => fs::read_to_string(&path).map_err(|source| CliError::InputFile {
            path: path.display().to_string(),
            source,
        }),
        None => read_stdin_string(),
    }
}

fn read_stdin_string() -> Result<String, CliError> {
    let mut content = String::new();
    std::io::stdin()
        .read_to_string(&mut content)
        .map_err(CliError::Stdin)?;
    Ok(content)
}

fn read_stdin_bytes() -> Result<Vec<u8>, CliError> {
    let mut content = Vec::new();
    std::io::stdin()
        .read_to_end(&mut content)
        .map_err(CliError::Stdin)?;
    Ok(content)
}
