pub mod dom;
pub mod js_executor;

pub use dom::{
    BrowserLauncher, BrowserSession, ControlKind, DomHandle, DropdownRoot, ListingEntry,
    OptionItem,
};
pub use js_executor::JsExecutor;
