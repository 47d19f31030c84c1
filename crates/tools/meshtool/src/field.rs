//! Compiled scalar field expressions over `x`, `y`, `z`.

use fasteval::{Compiler, Evaler, Instruction, Slab};
use smc::glam::DVec3;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum FieldError {
    #[error("Expression error: {0}")]
    Compile(String),
}

/// A field expression compiled once and evaluated per sample point.
pub struct CompiledField {
    slab: Slab,
    compiled: Instruction,
}

impl CompiledField {
    pub fn compile(expr: &str) -> Result<Self, FieldError> {
        let parser = fasteval::Parser::new();
        let mut slab = Slab::new();
        let compiled = parser
            .parse(expr, &mut slab.ps)
            .map_err(|e| FieldError::Compile(e.to_string()))?
            .from(&slab.ps)
            .compile(&slab.ps, &mut slab.cs);
        let field = Self { slab, compiled };
        // Surface undefined variables now instead of at the first sample
        field
            .try_eval(DVec3::ZERO)
            .map_err(|e| FieldError::Compile(e.to_string()))?;
        Ok(field)
    }

    fn try_eval(&self, p: DVec3) -> Result<f64, fasteval::Error> {
        let mut ns = |name: &str, _args: Vec<f64>| -> Option<f64> {
            match name {
                "x" => Some(p.x),
                "y" => Some(p.y),
                "z" => Some(p.z),
                _ => None,
            }
        };
        self.compiled.eval(&self.slab, &mut ns)
    }

    /// Evaluate the field at a point. The expression was validated during
    /// compilation, so this cannot fail; numeric domain errors yield NaN.
    pub fn eval(&self, p: DVec3) -> f64 {
        self.try_eval(p).unwrap_or(f64::NAN)
    }
}
