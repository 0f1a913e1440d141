//! Query, resolve and decode one target

use std::sync::Arc;

use clap::Args;
use colored::Colorize;
use htsprobe_common::{decode, AlignmentContainer, DecodedSummary, Ticket};
use htsprobe_harness::{HarnessError, HttpTransport, SegmentFetcher, TicketResolver};
use serde::Serialize;
use tracing::info;

use super::query::{print_ticket, TargetArgs};
use super::{failure_line, maybe_spawn, Context, SpawnArgs};
use crate::output::{print_error, print_fields, print_heading, print_value, print_warning};

#[derive(Args)]
pub struct FetchArgs {
    #[command(flatten)]
    pub target: TargetArgs,

    /// Also print the ticket's segments
    #[arg(long)]
    pub show_ticket: bool,

    #[command(flatten)]
    pub spawn: SpawnArgs,
}

#[derive(Serialize)]
struct FetchReport {
    ticket: Ticket,
    payload_bytes: usize,
    payload_sha256: String,
    segment_sizes: Vec<usize>,
    summary: DecodedSummary,
}

pub async fn execute(args: FetchArgs, ctx: &Context) -> anyhow::Result<()> {
    let data_dir = args
        .spawn
        .server
        .data_dir
        .clone()
        .unwrap_or_else(|| ctx.config.server.data_dir.clone());
    let target = args.target.resolve(&data_dir)?;

    let (server, base_url) = maybe_spawn(ctx, &args.spawn).await?;
    let outcome: Result<FetchReport, HarnessError> = async {
        let client = ctx
            .client_for(&base_url)
            .map_err(|e| HarnessError::Config(e.to_string()))?;
        let ticket = client
            .query(target.endpoint, &target.id, &target.params)
            .await?;

        let transport = HttpTransport::from_client(client.http().clone());
        let resolver = TicketResolver::new(SegmentFetcher::new(Arc::new(transport)));
        let payload = resolver.resolve(&ticket).await?;
        info!(bytes = payload.len(), "payload resolved");

        let payload_bytes = payload.len();
        let payload_sha256 = payload.sha256_hex();
        let segment_sizes = payload.segment_sizes.clone();
        let summary = decode(payload)?;

        Ok(FetchReport {
            ticket,
            payload_bytes,
            payload_sha256,
            segment_sizes,
            summary,
        })
    }
    .await;

    if let Some(server) = server {
        server.stop().await;
    }

    let report = match outcome {
        Ok(report) => report,
        Err(e) => {
            print_error(&failure_line(&e));
            std::process::exit(1);
        }
    };

    if !ctx.format.is_human() {
        return print_value(&report, ctx.format);
    }

    if args.show_ticket {
        print_ticket(&report.ticket, ctx)?;
    }
    print_fields(
        "Payload",
        &[
            ("format", report.ticket.format.to_string()),
            ("bytes", report.payload_bytes.to_string()),
            ("segments", format!("{:?}", report.segment_sizes)),
            ("sha256", report.payload_sha256.clone()),
        ],
        ctx.format,
    );
    print_summary(&report.summary);
    Ok(())
}

fn more(shown: usize, total: u64) -> String {
    if total > shown as u64 {
        format!(" ({} of {})", shown, total).dimmed().to_string()
    } else {
        String::new()
    }
}

/// Human rendering of a decoded summary
pub fn print_summary(summary: &DecodedSummary) {
    match summary {
        DecodedSummary::Alignment(a) => {
            let container = match a.container {
                AlignmentContainer::Bam => "BAM",
                AlignmentContainer::Cram => "CRAM",
            };
            print_heading(&format!("{} alignment", container));
            println!(
                "   References{}: {}",
                more(a.reference_names.len(), a.reference_names.total),
                a.reference_names.items.join(", ")
            );
            println!(
                "   Mapped: {}   Unmapped: {}",
                a.mapped_count.to_string().green(),
                a.unmapped_count.to_string().yellow()
            );
            if !a.records_decoded {
                print_warning("Per-record detail is not decoded for this container");
                return;
            }
            println!("   Reads{}:", more(a.reads.len(), a.reads.total));
            for read in &a.reads.items {
                println!("     • {}", read);
            }
        }
        DecodedSummary::Variant(v) => {
            print_heading("Variants");
            println!(
                "   Samples{}: {}",
                more(v.samples.len(), v.samples.total),
                v.samples.items.join(", ")
            );
            println!("   Records{}:", more(v.records.len(), v.records.total));
            for record in &v.records.items {
                println!("     • {}", record);
            }
        }
        DecodedSummary::VariantText(t) => {
            print_heading("VCF text");
            if t.inflated {
                println!("   {}", "(inflated from gzip/BGZF)".dimmed());
            }
            if t.replaced_invalid {
                print_warning("Invalid UTF-8 was replaced");
            }
            println!("{}", t.text);
            if t.truncated {
                println!("{}", format!("… truncated, {} bytes total", t.total_bytes).dimmed());
            }
        }
        DecodedSummary::Raw(r) => {
            print_heading(&format!("{} (undecoded)", r.format));
            println!("{}", r.text);
            if r.truncated {
                println!("{}", format!("… truncated, {} bytes total", r.total_bytes).dimmed());
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_more_only_when_truncated() {
        colored::control::set_override(false);
        assert_eq!(more(10, 10), "");
        assert_eq!(more(10, 42), " (10 of 42)");
    }
}
