mod headless;

use anyhow::Result;
use tracing::level_filters::LevelFilter;

pub(crate) struct Options {
    pub level: LevelFilter,
    pub color: bool,
}

pub(crate) fn set_up(options: Options) -> Result<()> {
    headless::set_up(&options)
}
