//! Disassembler.
//!
//! Turns encoded words back into readable assembly for traces and the
//! debugger.

use crate::cpu::decode::{decode_at, decode_with};
use crate::cpu::Memory;
use super::ProgramImage;

/// Disassemble the instruction at `ip`. Returns the text and the width in
/// words; undecodable words are shown as `???` and count as one word.
pub fn disassemble_at(mem: &Memory, ip: u16) -> (String, u16) {
    match decode_at(mem, ip) {
        Ok(instr) => (instr.to_string(), instr.width()),
        Err(_) => (format!("??? ; 0x{:04X}", mem.read(ip)), 1),
    }
}

/// Disassemble `count` instructions starting at `ip`.
pub fn disassemble_range(mem: &Memory, ip: u16, count: usize) -> Vec<(u16, String)> {
    let mut out = Vec::with_capacity(count);
    let mut addr = ip;
    for _ in 0..count {
        let (text, width) = disassemble_at(mem, addr);
        out.push((addr, text));
        addr = mem.wrap(addr as usize + width as usize) as u16;
    }
    out
}

/// Disassemble a whole program image into a listing.
pub fn disassemble(image: &ProgramImage) -> String {
    let mut output = String::new();
    output.push_str("; Disassembly\n");
    output.push_str("; -----------\n\n");

    let words = &image.words;
    let mut offset = 0usize;
    while offset < words.len() {
        let addr = image.origin.wrapping_add(offset as u16);
        let fetch = |n: u16| words.get(offset + n as usize).copied().unwrap_or(0);
        let (text, width) = match decode_with(fetch) {
            Ok(instr) => (instr.to_string(), instr.width() as usize),
            Err(_) => (format!("??? ; 0x{:04X}", words[offset]), 1),
        };

        let raw: Vec<String> = words[offset..(offset + width).min(words.len())]
            .iter()
            .map(|w| format!("{:04X}", w))
            .collect();
        let line = image
            .source_line(addr)
            .map(|l| format!("  ; line {}", l))
            .unwrap_or_default();
        output.push_str(&format!("{:04X}: {:<16} {}{}\n", addr, raw.join(" "), text, line));

        offset += width;
    }

    output
}
