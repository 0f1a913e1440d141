//! Single segment inspection

use std::sync::Arc;

use anyhow::{anyhow, Context as _};
use clap::Args;
use colored::Colorize;
use htsprobe_common::Segment;
use htsprobe_harness::{inspect_segment, HttpTransport, SegmentFetcher, SegmentPreview};

use super::{ClassArg, Context};
use crate::output::{print_error, print_fields, print_heading, print_value};

#[derive(Args)]
pub struct InspectArgs {
    /// Segment URL (http(s) or data:)
    pub url: String,

    /// Request header as NAME=VALUE, repeatable
    #[arg(long = "header", short = 'H', value_parser = parse_header)]
    pub headers: Vec<(String, String)>,

    /// Segment class, for display only
    #[arg(long, value_enum, default_value = "body")]
    pub class: ClassArg,
}

fn parse_header(s: &str) -> anyhow::Result<(String, String)> {
    let (name, value) = s
        .split_once('=')
        .ok_or_else(|| anyhow!("expected NAME=VALUE, got {}", s))?;
    let name = name.trim();
    if name.is_empty() {
        return Err(anyhow!("header name is empty in {}", s));
    }
    Ok((name.to_string(), value.trim().to_string()))
}

pub async fn execute(args: InspectArgs, ctx: &Context) -> anyhow::Result<()> {
    let mut segment = Segment::new(args.url, args.class.into());
    for (name, value) in args.headers {
        segment = segment.with_header(name, value);
    }

    let transport = HttpTransport::new(ctx.config.request_timeout())
        .context("failed to build HTTP client")?;
    let fetcher = SegmentFetcher::new(Arc::new(transport));

    let inspection = match inspect_segment(&fetcher, &segment).await {
        Ok(inspection) => inspection,
        Err(e) => {
            print_error(&format!("Failed to fetch segment: {}", e));
            std::process::exit(1);
        }
    };

    if !ctx.format.is_human() {
        return print_value(&inspection, ctx.format);
    }

    print_fields(
        "Segment",
        &[
            ("url", inspection.url.clone()),
            ("status", inspection.status.to_string()),
            (
                "content type",
                inspection.content_type.clone().unwrap_or_else(|| "-".to_string()),
            ),
            ("length", format!("{} bytes", inspection.length)),
        ],
        ctx.format,
    );

    match &inspection.preview {
        SegmentPreview::Text { text, truncated } => {
            print_heading("Text preview");
            println!("{}", text);
            if *truncated {
                println!("{}", "… truncated".dimmed());
            }
        }
        SegmentPreview::Hex { dump, shown_bytes } => {
            print_heading(&format!(
                "Hex dump (first {} of {} bytes)",
                shown_bytes, inspection.length
            ));
            println!("{}", dump);
        }
    }
    Ok(())
}
