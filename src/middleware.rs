pub mod catch_panic;
pub mod trace;

pub use self::{
    catch_panic::{catch_panic, install_panic_hook},
    trace::SpanMaker,
};
