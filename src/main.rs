use clap::Parser;
use log::{error, info};
use netdiff::configuration::config::make_dump_root;
use netdiff::configuration::types::TestSetup;
use netdiff::packet_model::live::{DatalinkSessionFactory, SessionFactory};
use netdiff::test_case::{icmp, tls, TestCase};
use std::path::Path;
use std::sync::Arc;

// EX_USAGE, configuration problems are the caller's fault.
const EXIT_CONFIG: i32 = 64;

#[derive(Parser)]
#[command(name = "netdiff")]
#[command(version = "0.1.0")]
#[command(about = "Differential network testing against a golden platform")]
struct Args {
    config_file: String,
}

#[tokio::main]
async fn main() {
    // Example how to log
    // https://docs.rs/env_logger/latest/env_logger/
    env_logger::Builder::from_default_env()
        .filter_level(log::LevelFilter::Info)
        .format_target(false)
        .init();

    println!(
        "
███╗   ██╗███████╗████████╗██████╗ ██╗███████╗███████╗
████╗  ██║██╔════╝╚══██╔══╝██╔══██╗██║██╔════╝██╔════╝
██╔██╗ ██║█████╗     ██║   ██║  ██║██║█████╗  █████╗
██║╚██╗██║██╔══╝     ██║   ██║  ██║██║██╔══╝  ██╔══╝
██║ ╚████║███████╗   ██║   ██████╔╝██║██║     ██║
╚═╝  ╚═══╝╚══════╝   ╚═╝   ╚═════╝ ╚═╝╚═╝     ╚═╝
======================================================
   Differential network testing of platform stacks
======================================================
"
    );

    info!("Importing test setup");

    let args = Args::parse();

    if args.config_file.is_empty() {
        error!("No test setup file found");
        std::process::exit(EXIT_CONFIG);
    }

    let setup = match TestSetup::from_file(Path::new(args.config_file.as_str())) {
        Ok(setup) => setup,
        Err(e) => {
            error!("Unable to import test setup from file: {}", e);
            std::process::exit(EXIT_CONFIG);
        }
    };

    info!("Test setup imported successfully");

    let dump_root = match make_dump_root(&setup.dump.base_path) {
        Ok(root) => root,
        Err(e) => {
            error!("Unable to create the dump directory tree: {}", e);
            std::process::exit(1);
        }
    };
    info!(
        "Captures and reports go below {}",
        dump_root.display()
    );

    let factory: Arc<dyn SessionFactory> = Arc::new(DatalinkSessionFactory);
    let mut failed = false;

    match icmp::build(&setup, &dump_root, Arc::clone(&factory)) {
        Ok(Some(mut case)) => {
            if !run_case(&mut case).await {
                failed = true;
            }
        }
        Ok(None) => info!("ICMP test case not configured, skipping."),
        Err(e) => {
            error!("Unable to assemble the ICMP test case: {}", e);
            failed = true;
        }
    }

    match tls::build(&setup, &dump_root, Arc::clone(&factory)) {
        Ok(Some(mut case)) => {
            if !run_case(&mut case).await {
                failed = true;
            }
        }
        Ok(None) => info!("TLS handshake test case not configured, skipping."),
        Err(e) => {
            error!("Unable to assemble the TLS handshake test case: {}", e);
            failed = true;
        }
    }

    if failed {
        std::process::exit(1);
    }
}

/// Runs one test case; on error the case is torn down defensively so a
/// half-run never leaks processes or capture sessions into the next one.
async fn run_case(case: &mut TestCase) -> bool {
    info!("Running the {} test case.", case.name());
    match case.run().await {
        Ok(()) => true,
        Err(e) => {
            error!("The {} test case failed: {}", case.name(), e);
            case.unrun().await;
            false
        }
    }
}
