//! Sanity-check a merged tile file.
//!
//! Prints the shower header and checks every record against the grid and
//! count limits, and that records are sorted by (m, n, bin).
//!
//! Run with: cargo run --bin check-tile-file -- <tile_file> [tiles_per_side]

use std::env;
use std::fs::File;
use std::io::Read;
use std::process::ExitCode;

const HEADER_WORDS: usize = 273;
const RECORD_BYTES: usize = 12;
const COUNT_CEILING: u16 = 60_000;
const DEFAULT_TILES_PER_SIDE: u16 = 2800;

fn main() -> ExitCode {
    let args: Vec<String> = env::args().collect();
    if args.len() < 2 {
        eprintln!("Usage: {} <tile_file> [tiles_per_side]", args[0]);
        return ExitCode::from(2);
    }
    let tiles = match args.get(2).map(|s| s.parse::<u16>()) {
        None => DEFAULT_TILES_PER_SIDE,
        Some(Ok(tiles)) => tiles,
        Some(Err(e)) => {
            eprintln!("bad tiles_per_side: {e}");
            return ExitCode::from(2);
        }
    };

    let mut data = Vec::new();
    if let Err(e) = File::open(&args[1]).and_then(|mut f| f.read_to_end(&mut data)) {
        eprintln!("{}: {e}", args[1]);
        return ExitCode::from(2);
    }

    let header_bytes = HEADER_WORDS * 4;
    if data.len() < header_bytes {
        println!("FAIL: {} bytes, shorter than the header", data.len());
        return ExitCode::FAILURE;
    }
    let word = |i: usize| f32::from_le_bytes(data[4 * i..4 * i + 4].try_into().unwrap());
    println!("Primary id:        {}", word(2));
    println!("Energy:            {:.4e} GeV", word(3));
    println!("First interaction: {:.1} m", word(6) / 100.0);
    println!("Zenith:            {:.2} deg", word(10).to_degrees());
    println!("Azimuth:           {:.2} deg", word(11).to_degrees());

    let body = &data[header_bytes..];
    let mut problems = 0usize;
    if body.len() % RECORD_BYTES != 0 {
        println!("trailing {} bytes after the last record", body.len() % RECORD_BYTES);
        problems += 1;
    }

    let mut previous: Option<(u16, u16, i16)> = None;
    let mut records = 0usize;
    let mut total_top = 0u64;
    for chunk in body.chunks_exact(RECORD_BYTES) {
        let half = |i: usize| [chunk[2 * i], chunk[2 * i + 1]];
        let m = u16::from_le_bytes(half(0));
        let n = u16::from_le_bytes(half(1));
        let top = u16::from_le_bytes(half(2));
        let bottom = u16::from_le_bytes(half(3));
        let bin = i16::from_le_bytes(half(4));
        records += 1;
        total_top += u64::from(top);

        if m >= tiles || n >= tiles {
            println!("record {records}: tile ({m}, {n}) outside {tiles} x {tiles}");
            problems += 1;
        }
        if top > COUNT_CEILING || bottom > COUNT_CEILING {
            println!("record {records}: counts {top}/{bottom} above {COUNT_CEILING}");
            problems += 1;
        }
        let key = (m, n, bin);
        if previous.is_some_and(|p| p >= key) {
            println!("record {records}: ({m}, {n}, {bin}) out of order");
            problems += 1;
        }
        previous = Some(key);
    }

    println!("Records:           {records}");
    println!("Upper-layer VEM:   {total_top}");
    if problems == 0 {
        println!("OK");
        ExitCode::SUCCESS
    } else {
        println!("FAIL: {problems} problems");
        ExitCode::from(u8::try_from(problems.min(255)).unwrap_or(u8::MAX))
    }
}
