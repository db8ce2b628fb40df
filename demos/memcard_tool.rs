//! Memory Card Tool Example.
//!
//! Dumps or restores a card image, using an image file as an emulated card.
//!
//! ```bash
//! $ cargo run --example memcard_tool -- ./card.img --read ./dump.raw
//! Card is 4 Mbit (524288 bytes), serial [..]
//! Dumped 524288 bytes to ./dump.raw
//! $ cargo run --example memcard_tool -- ./card.img --write ./dump.raw ./edited.raw
//! Rewrote 3 of 64 blocks
//! ```
//!
//! Pass `-v` after the other arguments to print every frame sent to the card.

extern crate embedded_memcard;

mod linux;
use linux::*;

use std::fs::File;
use std::process::ExitCode;

use embedded_memcard::{MemCard, TransferError};

const USAGE: &str = "Usage:
    memcard_tool CARD.img --read DUMPFILE [-v]
    memcard_tool CARD.img --write OLDFILE NEWFILE [-v]
    memcard_tool -h | --help";

/// What we were asked to do.
#[derive(Debug)]
enum Command {
    Read { card: String, dump: String },
    Write { card: String, old: String, new: String },
}

fn parse_args(args: &[String]) -> Result<Option<(Command, bool)>, String> {
    if args.iter().any(|x| x == "-h" || x == "--help") {
        return Ok(None);
    }
    let print_frames = args.iter().any(|x| x == "-v");
    let args: Vec<&String> = args.iter().filter(|x| *x != "-v").collect();
    let command = match args.as_slice() {
        [card, flag, dump] if *flag == "--read" => Command::Read {
            card: card.to_string(),
            dump: dump.to_string(),
        },
        [card, flag, old, new] if *flag == "--write" => Command::Write {
            card: card.to_string(),
            old: old.to_string(),
            new: new.to_string(),
        },
        [] => return Err("No arguments given".into()),
        [_, flag, ..] if *flag == "--read" || *flag == "--write" => {
            return Err(format!("Wrong number of arguments for {}", flag))
        }
        _ => return Err(format!("Unrecognised arguments: {:?}", args)),
    };
    Ok(Some((command, print_frames)))
}

fn open_card(
    filename: &str,
    print_frames: bool,
) -> Result<MemCard<LinuxMemCard, StdDelay>, TransferError<std::io::Error>> {
    let card = LinuxMemCard::new(filename, print_frames).map_err(TransferError::Io)?;
    let card = MemCard::new(card, StdDelay);
    card.acquire()?;
    Ok(card)
}

fn run(command: Command, print_frames: bool) -> Result<(), TransferError<std::io::Error>> {
    match command {
        Command::Read { card, dump } => {
            let card = open_card(&card, print_frames)?;
            let header = card.read_header()?;
            println!(
                "Card is {} Mbit ({} bytes), serial {:02x?}",
                header.size_mb,
                header.total_size(),
                header.serial
            );
            let mut sink = StdIo(File::create(&dump).map_err(TransferError::Io)?);
            let copied = card.dump_to_sink(&header, &mut sink)?;
            println!("Dumped {} bytes to {}", copied, dump);
        }
        Command::Write { card, old, new } => {
            let card = open_card(&card, print_frames)?;
            let header = card.read_header()?;
            let mut old = StdIo(File::open(&old).map_err(TransferError::Io)?);
            let mut new = StdIo(File::open(&new).map_err(TransferError::Io)?);
            let rewritten = card.write_diff(&header, &mut old, &mut new)?;
            println!(
                "Rewrote {} of {} blocks",
                rewritten,
                header.num_blocks()
            );
        }
    }
    Ok(())
}

fn main() -> ExitCode {
    env_logger::init();
    let args: Vec<String> = std::env::args().skip(1).collect();
    match parse_args(&args) {
        Ok(None) => {
            println!("{}", USAGE);
            ExitCode::SUCCESS
        }
        Ok(Some((command, print_frames))) => match run(command, print_frames) {
            Ok(()) => ExitCode::SUCCESS,
            Err(e) => {
                println!("Error: {:?}", e);
                ExitCode::FAILURE
            }
        },
        Err(msg) => {
            println!("{}\n{}", msg, USAGE);
            ExitCode::from(2)
        }
    }
}

// ****************************************************************************
//
// End Of File
//
// ****************************************************************************
