//! Command line: `matrix [dim] [nrows] [--seed N] [--dump] [--quiet]`.

use cube::MAX_DIM;

use crate::error::MatrixError;

pub const DEFAULT_DIM: u32 = 0;
pub const DEFAULT_NROWS: usize = 1024;

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct RunArgs {
    pub dim: u32,
    pub nrows: usize,
    /// Fixed fill seed. `None` derives one from the launching process id.
    pub seed: Option<u64>,
    /// Gather the reduced matrix at coordinate 0 and print it.
    pub dump: bool,
    /// Suppress the per-process census line.
    pub quiet: bool,
}

impl Default for RunArgs {
    fn default() -> Self {
        RunArgs { dim: DEFAULT_DIM, nrows: DEFAULT_NROWS, seed: None, dump: false, quiet: false }
    }
}

/// Parse everything after the program name. Validates before anything is forked.
pub fn parse(args: &[String]) -> Result<RunArgs, MatrixError> {
    let mut run = RunArgs::default();
    let mut positional = 0;
    let mut i = 0;
    while i < args.len() {
        match args[i].as_str() {
            "--dump" => run.dump = true,
            "--quiet" | "-q" => run.quiet = true,
            "--seed" => {
                i += 1;
                let v = args.get(i).ok_or_else(|| MatrixError::InvalidArgument("--seed needs a value".into()))?;
                run.seed = Some(v.parse().map_err(|_| MatrixError::InvalidArgument(format!("bad seed '{v}'")))?);
            }
            flag if flag.starts_with("--") => {
                return Err(MatrixError::InvalidArgument(format!("unknown flag '{flag}'")));
            }
            v => {
                match positional {
                    0 => {
                        let d: i64 = v.parse().map_err(|_| MatrixError::InvalidArgument(format!("bad dim '{v}'")))?;
                        if !(0..=MAX_DIM as i64).contains(&d) { return Err(MatrixError::DimensionOutOfRange(d)); }
                        run.dim = d as u32;
                    }
                    1 => {
                        run.nrows = v.parse().map_err(|_| MatrixError::InvalidArgument(format!("bad nrows '{v}'")))?;
                    }
                    _ => return Err(MatrixError::InvalidArgument(format!("unexpected argument '{v}'"))),
                }
                positional += 1;
            }
        }
        i += 1;
    }
    if run.nrows < 1usize << run.dim {
        return Err(MatrixError::TooSmall { nrows: run.nrows, dim: run.dim });
    }
    Ok(run)
}
