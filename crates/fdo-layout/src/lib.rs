//! Hot-functions layout emitter and linker-script hot-fragment writer
//! (spec §4.8, §6 Output 2).

mod linker;
mod strategy;

pub use linker::{patch_linker_script, write_hot_fragment, LinkerError, HOT_FRAGMENT_SENTINEL};
pub use strategy::{order_functions, LayoutStrategy};
