//! File I/O for saving and loading generated assignments.
//!
//! `save` writes two files into a directory: a text rendering for humans and
//! a binary file that `load_all` reads back.
//!
//! Binary format for `generation.bin` (little endian):
//! - i32 x3: grid dimensions
//! - u64: seed
//! - u32: attempts
//! - u32: cell count, then one u32 module id per cell in grid index order
//! - u32: decision count
//! - repeat per decision:
//!   - i32 x3: coordinate
//!   - u32: module id
//!   - u8: 0 for commit, 1 for rollback

use std::fs::File;
use std::io::{BufReader, BufWriter, Read, Write};
use std::path::Path;

use crate::assignment::{format_assignment, Assignment};
use crate::generator::Generation;
use crate::grid::Dimensions;
use crate::modules::ModuleId;
use crate::wave::{Decision, DecisionKind, DecisionRecord};

pub const GENERATION_BIN: &str = "generation.bin";
pub const GENERATION_TXT: &str = "generation.txt";

/// Saves the generation to both text and binary files in `dir`.
pub fn save(dir: &Path, generation: &Generation) -> std::io::Result<()> {
    save_text(dir, generation)?;
    save_binary(dir, generation)?;
    Ok(())
}

fn save_text(dir: &Path, generation: &Generation) -> std::io::Result<()> {
    let mut file = File::create(dir.join(GENERATION_TXT))?;
    let dims = generation.assignment.dimensions();
    writeln!(
        file,
        "Grid {}x{}x{}, seed {}, {} attempt(s), {} decisions\n",
        dims.x,
        dims.y,
        dims.z,
        generation.seed,
        generation.attempts,
        generation.decisions.len()
    )?;
    write!(file, "{}", format_assignment(&generation.assignment))?;
    Ok(())
}

fn save_binary(dir: &Path, generation: &Generation) -> std::io::Result<()> {
    let mut file = BufWriter::new(File::create(dir.join(GENERATION_BIN))?);

    let dims = generation.assignment.dimensions();
    for extent in [dims.x, dims.y, dims.z] {
        file.write_all(&extent.to_le_bytes())?;
    }
    file.write_all(&generation.seed.to_le_bytes())?;
    file.write_all(&(generation.attempts as u32).to_le_bytes())?;

    let modules = generation.assignment.modules();
    file.write_all(&(modules.len() as u32).to_le_bytes())?;
    for module in modules {
        file.write_all(&module.0.to_le_bytes())?;
    }

    let decisions = generation.decisions.entries();
    file.write_all(&(decisions.len() as u32).to_le_bytes())?;
    for decision in decisions {
        let (x, y, z) = decision.coord;
        for component in [x, y, z] {
            file.write_all(&component.to_le_bytes())?;
        }
        file.write_all(&decision.module.0.to_le_bytes())?;
        let kind: u8 = match decision.kind {
            DecisionKind::Commit => 0,
            DecisionKind::Rollback => 1,
        };
        file.write_all(&[kind])?;
    }

    file.flush()
}

fn read_u32(reader: &mut impl Read) -> Option<u32> {
    let mut buffer = [0u8; 4];
    reader.read_exact(&mut buffer).ok()?;
    Some(u32::from_le_bytes(buffer))
}

fn read_i32(reader: &mut impl Read) -> Option<i32> {
    let mut buffer = [0u8; 4];
    reader.read_exact(&mut buffer).ok()?;
    Some(i32::from_le_bytes(buffer))
}

/// Loads the generation saved in `dir`, or `None` if it is missing or
/// malformed.
pub fn load_all(dir: &Path) -> Option<Generation> {
    let mut file = BufReader::new(File::open(dir.join(GENERATION_BIN)).ok()?);

    let dimensions = Dimensions::new(
        read_i32(&mut file)?,
        read_i32(&mut file)?,
        read_i32(&mut file)?,
    );
    let mut seed_buffer = [0u8; 8];
    file.read_exact(&mut seed_buffer).ok()?;
    let seed = u64::from_le_bytes(seed_buffer);
    let attempts = read_u32(&mut file)? as usize;

    let cell_count = read_u32(&mut file)? as usize;
    if dimensions.cell_count() != Some(cell_count) {
        return None;
    }
    let modules = (0..cell_count)
        .map(|_| read_u32(&mut file).map(ModuleId))
        .collect::<Option<Vec<_>>>()?;

    let decision_count = read_u32(&mut file)? as usize;
    let mut entries = Vec::new();
    for _ in 0..decision_count {
        let coord = (
            read_i32(&mut file)?,
            read_i32(&mut file)?,
            read_i32(&mut file)?,
        );
        let module = ModuleId(read_u32(&mut file)?);
        let mut kind_buffer = [0u8; 1];
        file.read_exact(&mut kind_buffer).ok()?;
        let kind = match kind_buffer[0] {
            0 => DecisionKind::Commit,
            1 => DecisionKind::Rollback,
            _ => return None,
        };
        entries.push(Decision { coord, module, kind });
    }

    Some(Generation {
        assignment: Assignment::new(dimensions, modules)?,
        decisions: DecisionRecord::new(entries),
        seed,
        attempts,
    })
}
