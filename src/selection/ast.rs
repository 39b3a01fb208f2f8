use crate::core::{Angle, Dihedral, Frame, Improper};
use crate::selection::SelectionError;

/// Comparison operators of the selection language.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum CmpOp {
    Eq,
    Ne,
    Lt,
    Le,
    Gt,
    Ge,
}

impl CmpOp {
    fn apply(self, lhs: f64, rhs: f64) -> bool {
        match self {
            CmpOp::Eq => lhs == rhs,
            CmpOp::Ne => lhs != rhs,
            CmpOp::Lt => lhs < rhs,
            CmpOp::Le => lhs <= rhs,
            CmpOp::Gt => lhs > rhs,
            CmpOp::Ge => lhs >= rhs,
        }
    }
}

/// String-valued atom properties.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum StrProp {
    Name,
    Type,
    Resname,
}

/// Number-valued atom properties.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum NumProp {
    Index,
    Mass,
    Resid,
    X,
    Y,
    Z,
    Vx,
    Vy,
    Vz,
}

/// Argument of a connectivity predicate: a tuple variable or a literal
/// atom index.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum Arg {
    Variable(u8),
    Index(usize),
}

impl Arg {
    fn resolve(self, tuple: &[usize]) -> Option<usize> {
        match self {
            // Variables are 1-based in the language
            Arg::Variable(v) => tuple.get(v as usize - 1).copied(),
            Arg::Index(i) => Some(i),
        }
    }

    fn max_variable(self) -> u8 {
        match self {
            Arg::Variable(v) => v,
            Arg::Index(_) => 0,
        }
    }
}

/// A compiled selection expression.
#[derive(Debug)]
pub(crate) enum Ast {
    All,
    None,
    And(Box<Ast>, Box<Ast>),
    Or(Box<Ast>, Box<Ast>),
    Not(Box<Ast>),
    /// `name == S`, `type != S`, or the `name A B C` shorthand
    Str {
        prop: StrProp,
        variable: u8,
        equals: bool,
        values: Vec<String>,
    },
    /// `index < 10`, `mass >= 12.0`, ...
    Num {
        prop: NumProp,
        variable: u8,
        op: CmpOp,
        value: f64,
    },
    IsBonded(Arg, Arg),
    IsAngle(Arg, Arg, Arg),
    IsDihedral(Arg, Arg, Arg, Arg),
    IsImproper(Arg, Arg, Arg, Arg),
}

impl Ast {
    /// Highest tuple variable used anywhere in the expression.
    pub(crate) fn max_variable(&self) -> u8 {
        match self {
            Ast::All | Ast::None => 1,
            Ast::And(lhs, rhs) | Ast::Or(lhs, rhs) => lhs.max_variable().max(rhs.max_variable()),
            Ast::Not(inner) => inner.max_variable(),
            Ast::Str { variable, .. } | Ast::Num { variable, .. } => (*variable).max(1),
            Ast::IsBonded(a, b) => a.max_variable().max(b.max_variable()).max(1),
            Ast::IsAngle(a, b, c) => a
                .max_variable()
                .max(b.max_variable())
                .max(c.max_variable())
                .max(1),
            Ast::IsDihedral(a, b, c, d) | Ast::IsImproper(a, b, c, d) => a
                .max_variable()
                .max(b.max_variable())
                .max(c.max_variable())
                .max(d.max_variable())
                .max(1),
        }
    }

    /// Evaluate the expression against one tuple of atom indices.
    pub(crate) fn evaluate(&self, frame: &Frame, tuple: &[usize]) -> Result<bool, SelectionError> {
        match self {
            Ast::All => Ok(true),
            Ast::None => Ok(false),
            Ast::And(lhs, rhs) => Ok(lhs.evaluate(frame, tuple)? && rhs.evaluate(frame, tuple)?),
            Ast::Or(lhs, rhs) => Ok(lhs.evaluate(frame, tuple)? || rhs.evaluate(frame, tuple)?),
            Ast::Not(inner) => Ok(!inner.evaluate(frame, tuple)?),
            Ast::Str {
                prop,
                variable,
                equals,
                values,
            } => {
                let index = self.variable_index(*variable, tuple)?;
                let topology = frame.topology();
                let actual = match prop {
                    StrProp::Name => topology[index].name(),
                    StrProp::Type => topology[index].type_name(),
                    StrProp::Resname => match topology.residue_for_atom(index) {
                        Some(residue) => residue.name(),
                        // An atom without a residue matches nothing
                        None => return Ok(false),
                    },
                };
                let matched = values.iter().any(|value| value == actual);
                Ok(matched == *equals)
            }
            Ast::Num {
                prop,
                variable,
                op,
                value,
            } => {
                let index = self.variable_index(*variable, tuple)?;
                let actual = match prop {
                    NumProp::Index => index as f64,
                    NumProp::Mass => frame.topology()[index].mass(),
                    NumProp::Resid => match frame
                        .topology()
                        .residue_for_atom(index)
                        .and_then(|residue| residue.id())
                    {
                        Some(id) => id as f64,
                        None => return Ok(false),
                    },
                    NumProp::X => frame.positions()[index][0],
                    NumProp::Y => frame.positions()[index][1],
                    NumProp::Z => frame.positions()[index][2],
                    // A frame without velocities has them all at zero
                    NumProp::Vx => velocity(frame, index, 0),
                    NumProp::Vy => velocity(frame, index, 1),
                    NumProp::Vz => velocity(frame, index, 2),
                };
                Ok(op.apply(actual, *value))
            }
            Ast::IsBonded(a, b) => {
                let (Some(i), Some(j)) = (a.resolve(tuple), b.resolve(tuple)) else {
                    return Ok(false);
                };
                let size = frame.size();
                if i >= size || j >= size || i == j {
                    return Ok(false);
                }
                Ok(frame.topology().contains_bond(i, j))
            }
            Ast::IsAngle(a, b, c) => {
                let (Some(i), Some(j), Some(k)) =
                    (a.resolve(tuple), b.resolve(tuple), c.resolve(tuple))
                else {
                    return Ok(false);
                };
                match Angle::new(i, j, k) {
                    Ok(angle) if in_range(frame, &[i, j, k]) => {
                        Ok(frame.topology().contains_angle(angle))
                    }
                    _ => Ok(false),
                }
            }
            Ast::IsDihedral(a, b, c, d) => {
                let (Some(i), Some(j), Some(k), Some(m)) = (
                    a.resolve(tuple),
                    b.resolve(tuple),
                    c.resolve(tuple),
                    d.resolve(tuple),
                ) else {
                    return Ok(false);
                };
                match Dihedral::new(i, j, k, m) {
                    Ok(dihedral) if in_range(frame, &[i, j, k, m]) => {
                        Ok(frame.topology().contains_dihedral(dihedral))
                    }
                    _ => Ok(false),
                }
            }
            Ast::IsImproper(a, b, c, d) => {
                let (Some(i), Some(j), Some(k), Some(m)) = (
                    a.resolve(tuple),
                    b.resolve(tuple),
                    c.resolve(tuple),
                    d.resolve(tuple),
                ) else {
                    return Ok(false);
                };
                match Improper::new(i, j, k, m) {
                    Ok(improper) if in_range(frame, &[i, j, k, m]) => {
                        Ok(frame.topology().contains_improper(improper))
                    }
                    _ => Ok(false),
                }
            }
        }
    }

    fn variable_index(&self, variable: u8, tuple: &[usize]) -> Result<usize, SelectionError> {
        tuple
            .get(variable as usize - 1)
            .copied()
            .ok_or(SelectionError::VariableOutOfRange {
                variable,
                arity: tuple.len(),
            })
    }
}

fn velocity(frame: &Frame, index: usize, dim: usize) -> f64 {
    frame
        .velocities()
        .map(|velocities| velocities[index][dim])
        .unwrap_or(0.0)
}

fn in_range(frame: &Frame, indices: &[usize]) -> bool {
    indices.iter().all(|&i| i < frame.size())
}
