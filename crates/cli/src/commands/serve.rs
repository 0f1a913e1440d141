//! Supervise a server in the foreground

use clap::Args;
use colored::Colorize;
use htsprobe_harness::{ProcessSupervisor, ServerEvent, StreamKind};
use tokio::sync::broadcast::error::RecvError;

use super::{Context, ServerArgs};
use crate::output::{print_error, print_info, print_success, print_warning};

#[derive(Args)]
pub struct ServeArgs {
    #[command(flatten)]
    pub server: ServerArgs,
}

fn print_event(event: &ServerEvent) {
    match event {
        ServerEvent::Log(line) => match line.stream {
            StreamKind::Stdout => println!("{} {}", "│".dimmed(), line.line),
            StreamKind::Stderr => println!("{} {}", "│".red(), line.line),
        },
        ServerEvent::State { state } => {
            println!("{} {}", "●".cyan(), format!("server {}", state).bold())
        }
    }
}

pub async fn execute(args: ServeArgs, ctx: &Context) -> anyhow::Result<()> {
    let config = args.server.apply(&ctx.config.server);
    print_info(&format!(
        "Starting {} {} (data: {})",
        config.program,
        config.args.join(" "),
        config.data_dir.display()
    ));

    let mut supervisor = ProcessSupervisor::new(config);
    let mut events = supervisor.subscribe();
    let printer = tokio::spawn(async move {
        loop {
            match events.recv().await {
                Ok(event) => print_event(&event),
                Err(RecvError::Lagged(n)) => print_warning(&format!("{} output lines dropped", n)),
                Err(RecvError::Closed) => break,
            }
        }
    });

    match supervisor.start().await {
        Ok(handle) => print_success(&format!(
            "Server {} ready at {} (Ctrl+C to stop)",
            handle.pid, handle.base_url
        )),
        Err(e) => {
            print_error(&format!("Server failed to start: {}", e));
            printer.abort();
            std::process::exit(1);
        }
    }

    let exited = tokio::select! {
        _ = tokio::signal::ctrl_c() => false,
        _ = wait_for_exit(&mut supervisor) => true,
    };

    if exited {
        print_error("Server exited unexpectedly");
    }
    let outcome = supervisor.stop().await?;
    print_success(&format!("Server {}", outcome));
    printer.abort();

    if exited {
        std::process::exit(1);
    }
    Ok(())
}

async fn wait_for_exit(supervisor: &mut ProcessSupervisor) {
    let mut tick = tokio::time::interval(std::time::Duration::from_millis(500));
    loop {
        tick.tick().await;
        if !supervisor.is_running().await {
            return;
        }
    }
}
