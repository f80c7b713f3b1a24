//! Synthetic lyrics corpus generator
//!
//! Writes a header plus seeded records whose artist and text fields carry
//! commas, doubled quotes, line breaks and CRLF, for benchmarking and for
//! comparing reports across worker counts.
//!
//! Usage:
//!   cargo run --release --bin make_corpus -- <out.csv> [--records N] [--seed S]

use anyhow::{Context, Result};
use clap::Parser;
use rand::{rngs::StdRng, seq::SliceRandom, Rng, SeedableRng};
use std::{
    fs::File,
    io::{BufWriter, Write},
    path::PathBuf,
    time::Instant,
};

#[derive(Parser, Debug)]
#[command(name = "make_corpus", about = "Generate a synthetic lyrics corpus")]
struct Args {
    /// Output CSV path
    #[arg(value_name = "OUT")]
    out: PathBuf,

    /// Number of records after the header
    #[arg(short, long, default_value = "100000", value_name = "NUM")]
    records: usize,

    /// RNG seed; the same seed always produces the same file
    #[arg(short, long, default_value = "1")]
    seed: u64,
}

const ARTISTS: &[&str] = &[
    "ABBA",
    "Aerosmith",
    "Bob Dylan",
    "Caetano Veloso",
    "Elis Regina",
    "Guns N' Roses",
    "Earth, Wind & Fire",
    "The \"Big\" Band",
];

const WORDS: &[&str] = &[
    "love", "night", "heart", "baby", "amor", "dark", "smile", "road", "don't", "coração",
    "rain", "fire", "sad", "happy", "dance", "you", "me", "the", "and", "forever",
];

fn quote(field: &str) -> String {
    if field.contains([',', '"', '\n']) {
        format!("\"{}\"", field.replace('"', "\"\""))
    } else {
        field.to_string()
    }
}

fn lyric(rng: &mut StdRng) -> String {
    let lines = rng.gen_range(1..=6);
    let mut out = String::new();
    for l in 0..lines {
        if l > 0 {
            out.push_str(if rng.gen_bool(0.2) { "\r\n" } else { "\n" });
        }
        let words = rng.gen_range(2..=10);
        for w in 0..words {
            if w > 0 {
                out.push_str(if rng.gen_bool(0.1) { ", " } else { " " });
            }
            out.push_str(WORDS.choose(rng).copied().unwrap_or("la"));
        }
    }
    out
}

fn main() -> Result<()> {
    let Args { out, records, seed } = Args::parse();

    println!("=== Synthetic Corpus ===");
    println!("records={records} seed={seed} -> {}", out.display());
    let start = Instant::now();

    let file = File::create(&out).with_context(|| format!("create {}", out.display()))?;
    let mut w = BufWriter::with_capacity(1 << 20, file);
    writeln!(w, "artist,song,link,text")?;

    let mut rng = StdRng::seed_from_u64(seed);
    for i in 0..records {
        let artist = ARTISTS.choose(&mut rng).copied().unwrap_or("Unknown");
        let text = lyric(&mut rng);
        writeln!(
            w,
            "{},Song {i},/lyrics/{i}.html,{}",
            quote(artist),
            quote(&text)
        )?;
        if (i + 1) % 100_000 == 0 {
            println!("  {} records...", i + 1);
        }
    }
    w.flush()?;

    println!("Done in {:.2?}", start.elapsed());
    Ok(())
}
