use std::collections::BTreeSet;
use std::fmt::Write;

use crate::bof::ObjectFile;
use crate::codegen::instr::Instr;

/// Render a textual listing of an object file: header summary, text
/// segment with branch targets marked, then the data segment.
pub fn disassemble(obj: &ObjectFile) -> String {
    let mut out = String::new();
    let targets = branch_targets(&obj.text);

    let _ = writeln!(out, "object file");
    let _ = writeln!(
        out,
        "  text: {} words at {}",
        obj.text.len(),
        obj.header.text_start
    );
    let _ = writeln!(
        out,
        "  data: {} words at {}",
        obj.data.len(),
        obj.header.data_start
    );
    let _ = writeln!(out, "  stack bottom: {}", obj.header.stack_bottom);
    let _ = writeln!(out);

    for (ip, instr) in obj.text.iter().enumerate() {
        let marker = if targets.contains(&ip) { '►' } else { ' ' };
        let _ = write!(out, "{:04} {} {}", ip, marker, instr);
        if let Some(disp) = instr.branch_disp() {
            let _ = write!(out, "    ; -> {:04}", ip as i64 + 1 + disp as i64);
        }
        let _ = writeln!(out);
    }

    if !obj.data.is_empty() {
        let _ = writeln!(out);
        let _ = writeln!(out, "data");
        for (i, word) in obj.data.iter().enumerate() {
            let _ = writeln!(out, "{:04}   {}", i, word);
        }
    }

    out
}

/// Print the listing to stdout.
pub fn print_object(obj: &ObjectFile) {
    print!("{}", disassemble(obj));
}

/// Word indexes any branch in `text` can land on.
fn branch_targets(text: &[Instr]) -> BTreeSet<usize> {
    let mut targets = BTreeSet::new();
    for (ip, instr) in text.iter().enumerate() {
        if let Some(disp) = instr.branch_disp() {
            let target = ip as i64 + 1 + disp as i64;
            if target >= 0 {
                targets.insert(target as usize);
            }
        }
    }
    targets
}
