use clap::ValueEnum;

/// What to do when the result file already exists in the output directory.
#[derive(ValueEnum, Clone, Copy, Debug, PartialEq, Eq)]
pub enum OnConflict {
    Overwrite,
    Rename,
}
