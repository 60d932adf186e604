// tools/atlink_cli/main.rs
//
// Operator console for AT-command serial devices. Exercises the same public
// channel surface a bridge process would: one-shot commands, an interactive
// console, and a notification-sink monitor.

use std::io::{BufRead, Write};

use clap::{Parser, Subcommand};

use atlink::{list_ports, AtChannel, AtError, ChannelMode, SerialTransport};

#[derive(Parser)]
#[command(name = "atlink_cli", about = "AT-command serial device console")]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// List available serial ports
    List {
        /// Emit machine-readable JSON
        #[arg(long)]
        json: bool,
    },
    /// Send one command and print the response lines
    Cmd {
        /// Device path (e.g. /dev/ttyUSB0)
        #[arg(long)]
        device: String,
        /// Command body without the AT prefix (e.g. '$LED=1')
        body: String,
    },
    /// Interactive console reading command bodies from stdin
    Console {
        /// Device path (e.g. /dev/ttyUSB0)
        #[arg(long)]
        device: String,
    },
    /// Print unsolicited notification lines until interrupted
    Listen {
        /// Device path (e.g. /dev/ttyUSB0)
        #[arg(long)]
        device: String,
    },
}

fn main() {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    let cli = Cli::parse();
    if let Err(e) = run(cli.command) {
        eprintln!("error: {}", e);
        std::process::exit(1);
    }
}

fn run(command: Command) -> Result<(), AtError> {
    match command {
        Command::List { json } => {
            let ports = list_ports()?;
            if json {
                let rendered = serde_json::to_string_pretty(&ports)
                    .map_err(|e| AtError::Config(format!("render port list: {}", e)))?;
                println!("{}", rendered);
            } else if ports.is_empty() {
                println!("no serial ports found");
            } else {
                for p in ports {
                    let product = p.product.unwrap_or_else(|| "-".to_string());
                    println!("{}  [{}]  {}", p.path, p.port_type, product);
                }
            }
            Ok(())
        }

        Command::Cmd { device, body } => {
            let transport = SerialTransport::open(&device)?;
            let channel = AtChannel::new(transport, ChannelMode::Driven);
            let result = print_command(&channel, &body);
            channel.close();
            match result {
                // ERROR was already printed; signal it via the exit code
                Err(AtError::Command) => std::process::exit(2),
                other => other,
            }
        }

        Command::Console { device } => {
            let transport = SerialTransport::open(&device)?;
            let channel = AtChannel::new(transport, ChannelMode::Driven);

            let stdin = std::io::stdin();
            let mut stdout = std::io::stdout();
            loop {
                print!("> ");
                let _ = stdout.flush();

                let mut body = String::new();
                match stdin.lock().read_line(&mut body) {
                    Ok(0) => break, // EOF
                    Ok(_) => {}
                    Err(e) => {
                        eprintln!("stdin: {}", e);
                        break;
                    }
                }
                let body = body.trim();
                if body.is_empty() {
                    continue;
                }

                match print_command(&channel, body) {
                    Ok(()) | Err(AtError::Command) => {}
                    // Transport faults are fatal; the channel is done
                    Err(e) => {
                        channel.close();
                        return Err(e);
                    }
                }
            }
            channel.close();
            Ok(())
        }

        Command::Listen { device } => {
            let transport = SerialTransport::open(&device)?;
            let channel = AtChannel::new(transport, ChannelMode::Background);
            channel.register_notification_sink(|line| println!("{}", line))?;
            channel.run_background()?;

            eprintln!("listening on {}; press Ctrl-C to stop", device);
            loop {
                std::thread::park();
            }
        }
    }
}

fn print_command<T: atlink::LineTransport>(
    channel: &AtChannel<T>,
    body: &str,
) -> Result<(), AtError> {
    match channel.command(body) {
        Ok(lines) => {
            for line in lines {
                println!("{}", line);
            }
            println!("OK");
            Ok(())
        }
        Err(AtError::Command) => {
            println!("ERROR");
            Err(AtError::Command)
        }
        Err(e) => Err(e),
    }
}
