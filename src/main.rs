use clap::Parser;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;

mod config;
mod data_source;
mod error;
mod export;
mod processing;
mod protocol;
mod render;
mod service;

use config::{AcquisitionSettings, CaptureArgs, Cli, Command, LiveArgs};
use data_source::DataSource;
use data_source::serial::SerialDataSource;
use error::SpectrometerError;
use render::{LiveView, RenderSink};
use service::{AcquisitionLoop, EndReason, Pipeline, StopToken, run_overlay, run_stats};

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    // Initialize tracing with colors and stderr output
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::fmt::layer()
                .with_ansi(true)
                .with_writer(std::io::stderr),
        )
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "espectro=info".into()),
        )
        .init();

    let cli = Cli::parse();

    // Handle --list-ports
    if cli.list_ports {
        list_serial_ports();
        return Ok(());
    }

    let Some(command) = cli.command.clone() else {
        eprintln!("Error: Please specify a command (capture, live, stats or overlay)");
        eprintln!("Use --help for usage information");
        std::process::exit(1);
    };

    match command {
        Command::Capture(args) => run_capture(&cli, &args).await,
        Command::Live(args) => run_live(&cli, &args).await,
        Command::Stats(args) => {
            let report = run_stats(&args.dir, args.bins, args.dpi)?;
            println!("{}", report);
            println!("Histogram saved to {}", report.image.display());
            Ok(())
        }
        Command::Overlay(args) => {
            let report = run_overlay(&args.dir, &args.title, args.dpi)?;
            println!(
                "Overlay of {} captures saved to {}",
                report.captures,
                report.image.display()
            );
            for (i, file) in report.files.iter().enumerate() {
                println!("  e{}  {}", i + 1, file.display());
            }
            Ok(())
        }
    }
}

/// Single-shot capture; exits with status 1 when no spectrum arrives in time
async fn run_capture(cli: &Cli, args: &CaptureArgs) -> Result<(), Box<dyn std::error::Error>> {
    let profile = cli.sensor_profile()?;
    let settings = args.to_settings()?;
    let acquisition = AcquisitionLoop::new(Pipeline::new(profile), settings);

    let mut data_source = args.source.to_data_source_config().create_source();
    tracing::info!("Starting {} source", data_source.name());
    let mut events = data_source.start().await?;

    let result = acquisition
        .capture_and_export(&mut events, &args.data_dir, args.dpi)
        .await;

    // The reader may be blocked on a full channel until the receiver goes away
    drop(events);
    stop_source(data_source.as_mut()).await;

    match result {
        Ok(report) => {
            if let Ok(image) = &report.image {
                println!("Image saved to {}", image.display());
            }
            if let Ok(table) = &report.table {
                println!("Data saved to {}", table.display());
            }
            if !report.is_complete() {
                eprintln!("Warning: the capture was only partly saved");
            }
            report.ensure_saved()?;
            Ok(())
        }
        Err(SpectrometerError::CaptureTimeout(limit)) => {
            eprintln!("Error: no valid spectrum received within {:?}", limit);
            std::process::exit(1);
        }
        Err(e) => Err(e.into()),
    }
}

/// Continuous live view until a quit key, Ctrl+C or the end of the source
async fn run_live(cli: &Cli, args: &LiveArgs) -> Result<(), Box<dyn std::error::Error>> {
    let profile = cli.sensor_profile()?;
    let acquisition = AcquisitionLoop::new(Pipeline::new(profile), AcquisitionSettings::default());
    let pipeline = acquisition.pipeline();

    let stop = StopToken::new();
    tokio::spawn(shutdown_signal(stop.clone()));

    let mut data_source = args.source.to_data_source_config().create_source();
    tracing::info!("Starting {} source", data_source.name());
    let mut events = data_source.start().await?;

    let mut view = match LiveView::open(
        pipeline.axis().clone(),
        pipeline.colors().clone(),
        pipeline.calibrator().y_max(),
        stop.clone(),
    ) {
        Ok(view) => view,
        Err(e) => {
            drop(events);
            stop_source(data_source.as_mut()).await;
            return Err(e.into());
        }
    };

    let result = acquisition.run_continuous(&mut events, &mut view, &stop).await;

    if let Err(e) = view.close() {
        tracing::warn!("Failed to restore the terminal: {}", e);
    }
    drop(events);
    stop_source(data_source.as_mut()).await;

    let summary = result?;
    let end = match summary.end {
        EndReason::StopRequested => "stopped",
        EndReason::SourceClosed => "source closed",
    };
    println!(
        "Live view {}: {} frames, {} rejected lines, {} transport errors",
        end, summary.frames, summary.rejected, summary.transport_errors
    );
    Ok(())
}

/// Stop a started source, logging instead of failing
async fn stop_source(source: &mut dyn DataSource) {
    if !source.is_active() {
        tracing::debug!("{} already finished", source.name());
    }
    if let Err(e) = source.stop().await {
        tracing::warn!("Failed to stop {}: {}", source.name(), e);
    }
}

/// List available serial ports
fn list_serial_ports() {
    match SerialDataSource::list_available_ports() {
        Ok(ports) => {
            if ports.is_empty() {
                println!("No serial ports found");
            } else {
                println!("Available serial ports:");
                for port in ports {
                    let port_type = match port.port_type {
                        serialport::SerialPortType::UsbPort(info) => {
                            format!(
                                "USB - {}",
                                info.product.unwrap_or_else(|| "Unknown".to_string())
                            )
                        }
                        serialport::SerialPortType::BluetoothPort => "Bluetooth".to_string(),
                        serialport::SerialPortType::PciPort => "PCI".to_string(),
                        serialport::SerialPortType::Unknown => "Unknown".to_string(),
                    };
                    println!("  {} - {}", port.port_name, port_type);
                }
            }
        }
        Err(e) => {
            eprintln!("Error listing serial ports: {}", e);
        }
    }
}

/// Request a stop on Ctrl+C
async fn shutdown_signal(stop: StopToken) {
    match tokio::signal::ctrl_c().await {
        Ok(()) => {
            tracing::info!("Received shutdown signal");
            stop.request();
        }
        Err(e) => tracing::warn!("Failed to install Ctrl+C handler: {}", e),
    }
}
