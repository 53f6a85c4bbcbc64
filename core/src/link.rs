//! The linker. Lays the program out (startup stub, the copy helper, the
//! function bodies, the data stream, the stack label), coalesces adjacent
//! label definitions and serializes the line list into the final listing.

use crate::{
    asm::{Constant, Instr, Label, Line, Register, Value},
    error::CompileError,
    generate::{copy_subroutine, GeneratedProgram},
    Compiler,
};

/// Merges every run of adjacent label definitions into the run's first
/// label. The later labels take on the first one's id, so every reference
/// holding their handles follows along. Iterates by index; removing a line
/// shifts the tail down without skipping the new neighbor.
fn coalesce_labels(lines: &mut Vec<Line>) {
    let mut index = 0;
    while index + 1 < lines.len() {
        let merged = match (&lines[index], &lines[index + 1]) {
            (Line::Label(first), Line::Label(second)) => {
                second.assign_id_of(first);
                true
            }
            _ => false,
        };
        if merged {
            lines.remove(index + 1);
        } else {
            index += 1;
        }
    }
}

impl Compiler<GeneratedProgram> {
    /// Assembles the full program. Startup points SP at the stack label
    /// (placed word-aligned after everything else), calls `main` and halts.
    pub(crate) fn link(self) -> Result<Compiler<Vec<Line>>, CompileError> {
        let GeneratedProgram {
            code,
            data,
            copy,
            main,
        } = self.0;
        let main = main.ok_or(CompileError::MissingMain)?;
        let stack = Label::fresh();

        let mut lines = vec![
            Line::Instr(Instr::Mov(
                Register::Sp,
                Value::Imm(Constant::Label(stack.clone())),
            )),
            Line::Instr(Instr::Bl(main)),
            Line::Instr(Instr::Halt),
        ];
        lines.extend(copy_subroutine(&copy));
        lines.extend(code);
        lines.extend(data);
        lines.push(Line::Align(4));
        lines.push(Line::Label(stack));

        coalesce_labels(&mut lines);
        log::debug!("linked {} lines", lines.len());
        Ok(Compiler(lines))
    }
}

impl Compiler<Vec<Line>> {
    /// The final listing: every line in target syntax, newline-joined.
    pub(crate) fn serialize(self) -> String {
        self.0
            .iter()
            .map(ToString::to_string)
            .collect::<Vec<_>>()
            .join("\n")
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::asm::Label;

    #[test]
    fn test_coalesce_merges_runs_and_retargets() {
        let a = Label::fresh();
        let b = Label::fresh();
        let c = Label::fresh();
        // A branch holding a handle to `c`, which sits in a three-label run.
        let branch = Line::Instr(Instr::B(c.clone()));
        let mut lines = vec![
            Line::Label(a.clone()),
            Line::Label(b.clone()),
            Line::Label(c.clone()),
            Line::Instr(Instr::Halt),
            branch,
        ];
        coalesce_labels(&mut lines);
        assert_eq!(lines.len(), 3);
        assert!(matches!(&lines[0], Line::Label(l) if *l == a));
        // The reference through the merged label now renders the survivor.
        match &lines[2] {
            Line::Instr(Instr::B(target)) => assert_eq!(*target, a),
            other => panic!("expected branch, got {:?}", other),
        }
        // No two label lines remain adjacent.
        for pair in lines.windows(2) {
            assert!(!matches!(
                (&pair[0], &pair[1]),
                (Line::Label(_), Line::Label(_))
            ));
        }
    }

    #[test]
    fn test_coalesce_leaves_separated_labels() {
        let a = Label::fresh();
        let b = Label::fresh();
        let mut lines = vec![
            Line::Label(a.clone()),
            Line::Instr(Instr::Halt),
            Line::Label(b.clone()),
        ];
        coalesce_labels(&mut lines);
        assert_eq!(lines.len(), 3);
        assert_ne!(a, b);
    }
}
