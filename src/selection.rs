//! The selection engine: a small query language over frames.
//!
//! Selections compile once and evaluate repeatedly against frames,
//! producing sorted lists of atom indices (arity 1) or index tuples
//! (arity 2 to 4):
//!
//! ```
//! use mdio::selection::Selection;
//! # use mdio::core::{Atom, Frame, Vector3D};
//! let mut frame = Frame::new();
//! frame.add_atom(Atom::new("O"), Vector3D::zeros(), None);
//! frame.add_atom(Atom::new("H"), Vector3D::zeros(), None);
//!
//! let selection = Selection::new("name == O and index < 10").unwrap();
//! let oxygens = selection.list(&frame).unwrap();
//! assert_eq!(oxygens.to_vec(), vec![0]);
//! ```

mod ast;
mod grammar;

use sorted_vec::SortedSet;
use thiserror::Error;

use crate::core::Frame;
use ast::Ast;

/// Error raised when compiling or evaluating a selection.
#[derive(Debug, Error)]
pub enum SelectionError {
    #[error("syntax error at byte {offset} in selection: expected {expected}")]
    Syntax { offset: usize, expected: String },

    #[error("variable #{variable} is out of range for a selection of arity {arity}")]
    VariableOutOfRange { variable: u8, arity: usize },

    #[error("this selection has arity {0}, not 1; use evaluate instead of list")]
    NotAtomArity(usize),
}

/// What a selection iterates over.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Context {
    /// Single atoms (arity 1)
    Atoms,
    /// All ordered pairs of distinct atoms (arity 2)
    Pairs,
    /// All ordered triples of distinct atoms (arity 3)
    Three,
    /// All ordered quadruplets of distinct atoms (arity 4)
    Four,
    /// The bonds of the topology (arity 2)
    Bonds,
    /// The angles derived from the bonds (arity 3)
    Angles,
    /// The dihedrals derived from the bonds (arity 4)
    Dihedrals,
    /// The impropers derived from the bonds (arity 4)
    Impropers,
}

impl Context {
    pub fn arity(self) -> usize {
        match self {
            Context::Atoms => 1,
            Context::Pairs | Context::Bonds => 2,
            Context::Three | Context::Angles => 3,
            Context::Four | Context::Dihedrals | Context::Impropers => 4,
        }
    }
}

/// One selection match: an arity-long tuple of atom indices.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub struct Match {
    size: usize,
    indices: [usize; 4],
}

impl Match {
    fn new(indices: &[usize]) -> Match {
        let mut data = [0; 4];
        data[..indices.len()].copy_from_slice(indices);
        Match {
            size: indices.len(),
            indices: data,
        }
    }

    pub fn len(&self) -> usize {
        self.size
    }

    pub fn is_empty(&self) -> bool {
        self.size == 0
    }

    /// The matched indices, in tuple order.
    pub fn indices(&self) -> &[usize] {
        &self.indices[..self.size]
    }
}

impl std::ops::Index<usize> for Match {
    type Output = usize;
    fn index(&self, i: usize) -> &usize {
        &self.indices()[i]
    }
}

/// A compiled selection.
#[derive(Debug)]
pub struct Selection {
    context: Context,
    ast: Ast,
    selection_string: String,
}

impl Selection {
    /// Compile a selection string.
    ///
    /// An optional context prefix (`atoms:`, `pairs:`, `three:`, `four:`,
    /// `bonds:`, `angles:`, `dihedrals:`, `impropers:`) declares what the
    /// expression iterates over; the default is single atoms.
    pub fn new(selection: &str) -> Result<Selection, SelectionError> {
        let (context, ast) =
            grammar::selection_grammar::selection(selection).map_err(|error| {
                SelectionError::Syntax {
                    offset: error.location.offset,
                    expected: error.expected.to_string(),
                }
            })?;
        let max_variable = ast.max_variable() as usize;
        if max_variable > context.arity() {
            return Err(SelectionError::VariableOutOfRange {
                variable: max_variable as u8,
                arity: context.arity(),
            });
        }
        Ok(Selection {
            context,
            ast,
            selection_string: selection.to_owned(),
        })
    }

    /// The string this selection was compiled from.
    pub fn string(&self) -> &str {
        &self.selection_string
    }

    pub fn context(&self) -> Context {
        self.context
    }

    /// Size of the tuples produced by [Selection::evaluate].
    pub fn arity(&self) -> usize {
        self.context.arity()
    }

    /// Evaluate against a frame, producing a sorted, deduplicated list of
    /// matching tuples.
    pub fn evaluate(&self, frame: &Frame) -> Result<Vec<Match>, SelectionError> {
        let mut matches = Vec::new();
        let natoms = frame.size();

        match self.context {
            Context::Atoms => {
                for i in 0..natoms {
                    if self.ast.evaluate(frame, &[i])? {
                        matches.push(Match::new(&[i]));
                    }
                }
            }
            Context::Pairs => {
                for i in 0..natoms {
                    for j in 0..natoms {
                        if i != j && self.ast.evaluate(frame, &[i, j])? {
                            matches.push(Match::new(&[i, j]));
                        }
                    }
                }
            }
            Context::Three => {
                for i in 0..natoms {
                    for j in 0..natoms {
                        if i == j {
                            continue;
                        }
                        for k in 0..natoms {
                            if k != i && k != j && self.ast.evaluate(frame, &[i, j, k])? {
                                matches.push(Match::new(&[i, j, k]));
                            }
                        }
                    }
                }
            }
            Context::Four => {
                for i in 0..natoms {
                    for j in 0..natoms {
                        if i == j {
                            continue;
                        }
                        for k in 0..natoms {
                            if k == i || k == j {
                                continue;
                            }
                            for m in 0..natoms {
                                if m != i
                                    && m != j
                                    && m != k
                                    && self.ast.evaluate(frame, &[i, j, k, m])?
                                {
                                    matches.push(Match::new(&[i, j, k, m]));
                                }
                            }
                        }
                    }
                }
            }
            Context::Bonds => {
                for bond in frame.topology().bonds() {
                    for tuple in [[bond[0], bond[1]], [bond[1], bond[0]]] {
                        if self.ast.evaluate(frame, &tuple)? {
                            matches.push(Match::new(&tuple));
                            break;
                        }
                    }
                }
            }
            Context::Angles => {
                for angle in frame.topology().angles() {
                    for tuple in [
                        [angle[0], angle[1], angle[2]],
                        [angle[2], angle[1], angle[0]],
                    ] {
                        if self.ast.evaluate(frame, &tuple)? {
                            matches.push(Match::new(&tuple));
                            break;
                        }
                    }
                }
            }
            Context::Dihedrals => {
                for dihedral in frame.topology().dihedrals() {
                    for tuple in [
                        [dihedral[0], dihedral[1], dihedral[2], dihedral[3]],
                        [dihedral[3], dihedral[2], dihedral[1], dihedral[0]],
                    ] {
                        if self.ast.evaluate(frame, &tuple)? {
                            matches.push(Match::new(&tuple));
                            break;
                        }
                    }
                }
            }
            Context::Impropers => {
                for improper in frame.topology().impropers() {
                    let tuple = [improper[0], improper[1], improper[2], improper[3]];
                    if self.ast.evaluate(frame, &tuple)? {
                        matches.push(Match::new(&tuple));
                    }
                }
            }
        }

        matches.sort_unstable();
        matches.dedup();
        Ok(matches)
    }

    /// Evaluate an arity-1 selection, producing the sorted set of matching
    /// atom indices.
    pub fn list(&self, frame: &Frame) -> Result<SortedSet<usize>, SelectionError> {
        if self.arity() != 1 {
            return Err(SelectionError::NotAtomArity(self.arity()));
        }
        let indices: Vec<usize> = self
            .evaluate(frame)?
            .into_iter()
            .map(|matched| matched[0])
            .collect();
        Ok(SortedSet::from(indices))
    }
}
