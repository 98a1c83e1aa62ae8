use std::env;

use anyhow::{Context, Result};
use lem_formats::DatFile;

fn main() -> Result<()> {
    env_logger::init();

    let path = env::args().nth(1).context("usage: dat_dump <DAT file>")?;
    let dat = DatFile::open(&path)?;
    println!(
        "{} chunks in {} ({} bytes)",
        dat.headers().len(),
        dat.path().display(),
        dat.bytes().len()
    );
    for (index, header) in dat.headers().iter().enumerate() {
        println!(
            "{index:>3} offset={offset:#08x} bits={bits} checksum={checksum:#04x} compressed={compressed:>7} decompressed={decompressed:>7}",
            offset = header.header_offset(),
            bits = header.initial_bit_count,
            checksum = header.checksum,
            compressed = header.compressed_len,
            decompressed = header.decompressed_len
        );
    }
    Ok(())
}
