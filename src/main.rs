// Copyright (C) 2026 Brian Johnson
//
// This program is free software; you can redistribute it and/or modify
// it under the terms of the GNU General Public License as published by
// the Free Software Foundation; either version 2 of the License, or
// (at your option) any later version.
//
// This program is distributed in the hope that it will be useful,
// but WITHOUT ANY WARRANTY; without even the implied warranty of
// MERCHANTABILITY or FITNESS FOR A PARTICULAR PURPOSE.  See the
// GNU General Public License for more details.
//
// You should have received a copy of the GNU General Public License along
// with this program; if not, write to the Free Software Foundation, Inc.,
// 51 Franklin Street, Fifth Floor, Boston, MA 02110-1301 USA.

// Stop-and-wait data link over a serial line
mod app;
mod error;
mod fault;
mod frame;
mod logging;
mod parser;
mod protocol;
mod serial;
mod session;
mod stats;
mod timer;
mod transfer;

use clap::{Parser, Subcommand};
use serialport::{DataBits, Parity, StopBits};
use std::path::PathBuf;
use protocol::Role;
use session::LinkConfig;

#[derive(Parser)]
#[command(name = "hdlink")]
#[command(about = "Reliable file transfer over a serial line with a stop-and-wait link layer", long_about = None)]
#[command(disable_help_subcommand = true)]
struct Cli {
    /// Serial port to use (e.g., /dev/ttyS0 or COM1)
    #[arg(short, long)]
    port: String,

    /// Baud rate
    #[arg(short, long, default_value = "9600")]
    baud: u32,

    /// Data bits (5, 6, 7, or 8)
    #[arg(long, default_value = "8", value_name = "BITS")]
    data_bits: u8,

    /// Parity (none, odd, or even)
    #[arg(long, default_value = "none")]
    parity: String,

    /// Stop bits (1 or 2)
    #[arg(long, default_value = "1", value_name = "BITS")]
    stop_bits: u8,

    /// Retransmissions allowed per frame before giving up
    #[arg(short, long, default_value = "3")]
    retries: u32,

    /// Seconds to wait for a reply before retransmitting
    #[arg(short, long, default_value = "4", value_name = "SECS")]
    timeout: u32,

    /// Largest payload carried by one information frame
    #[arg(long, default_value_t = protocol::MAX_PAYLOAD_SIZE, value_name = "BYTES")]
    max_payload: usize,

    /// Probability of deliberately corrupting an outgoing information frame
    #[arg(long, default_value = "0", value_name = "P")]
    error_rate: f64,

    /// Print link statistics when the connection closes
    #[arg(long)]
    stats: bool,

    /// Enable debug output
    #[arg(long)]
    debug: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Send a file as the transmitter
    Send {
        /// File to send
        file: PathBuf,

        /// Data bytes per packet
        #[arg(long, default_value_t = app::DEFAULT_PACKET_SIZE, value_name = "BYTES")]
        packet_size: usize,
    },
    /// Receive a file as the receiver
    Receive {
        /// Directory or file to save the received file to
        #[arg(short, long, default_value = ".")]
        output: PathBuf,
    },
}

fn parse_data_bits(bits: u8) -> Result<DataBits, String> {
    match bits {
        5 => Ok(DataBits::Five),
        6 => Ok(DataBits::Six),
        7 => Ok(DataBits::Seven),
        8 => Ok(DataBits::Eight),
        _ => Err(format!("Invalid data bits: {}. Must be 5, 6, 7, or 8", bits)),
    }
}

fn parse_parity(parity: &str) -> Result<Parity, String> {
    match parity.to_lowercase().as_str() {
        "none" => Ok(Parity::None),
        "odd" => Ok(Parity::Odd),
        "even" => Ok(Parity::Even),
        _ => Err(format!("Invalid parity: {}. Must be 'none', 'odd', or 'even'", parity)),
    }
}

fn parse_stop_bits(bits: u8) -> Result<StopBits, String> {
    match bits {
        1 => Ok(StopBits::One),
        2 => Ok(StopBits::Two),
        _ => Err(format!("Invalid stop bits: {}. Must be 1 or 2", bits)),
    }
}

fn build_config(cli: &Cli) -> Result<LinkConfig, String> {
    let role = match cli.command {
        Commands::Send { .. } => Role::Sender,
        Commands::Receive { .. } => Role::Receiver,
    };

    let mut config = LinkConfig::new(role, cli.port.clone());
    config.baud_rate = cli.baud;
    config.data_bits = parse_data_bits(cli.data_bits)?;
    config.parity = parse_parity(&cli.parity)?;
    config.stop_bits = parse_stop_bits(cli.stop_bits)?;
    config.retry_budget = cli.retries;
    config.timeout_secs = cli.timeout;
    config.max_payload = cli.max_payload;
    config.frame_error_rate = cli.error_rate;
    config.validate().map_err(|e| e.to_string())?;
    Ok(config)
}

fn main() {
    let cli = Cli::parse();
    logging::init(cli.debug);

    let config = match build_config(&cli) {
        Ok(config) => config,
        Err(e) => {
            eprintln!("Error: {}", e);
            std::process::exit(1);
        }
    };

    println!("Opening serial port: {}", config.port);
    println!(
        "Settings: {} baud, {:?}, {:?}, {:?}, {} retries, {}s timeout",
        config.baud_rate, config.data_bits, config.parity, config.stop_bits, config.retry_budget, config.timeout_secs
    );

    let mut session = match session::open(&config) {
        Ok(session) => session,
        Err(e) => {
            eprintln!("Failed to open connection: {}", e);
            std::process::exit(1);
        }
    };
    println!("Connection established as {:?}", session.role());

    let result = match &cli.command {
        Commands::Send { file, packet_size } => {
            println!("\nSending file: {}", file.display());
            app::send_file(&mut session, file, *packet_size)
                .map(|bytes| println!("\nSent {} bytes", bytes))
        }
        Commands::Receive { output } => {
            println!("\nReceiving to: {}", output.display());
            app::receive_file(&mut session, output)
                .map(|(path, info)| println!("\nReceived {} ({} bytes) into {}", info.name, info.size, path.display()))
        }
    };

    if let Err(e) = result {
        eprintln!("Transfer failed: {}", e);
        std::process::exit(1);
    }
    tracing::debug!(stats = ?session.statistics(), "transfer finished");

    if let Err(e) = session.close(cli.stats) {
        eprintln!("Failed to close connection: {}", e);
        std::process::exit(1);
    }
    println!("Connection closed");
}
