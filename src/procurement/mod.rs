//! Return Material Authorization form and the purchase order lookups
//! behind it.

mod orders;
mod rma;

pub use orders::{PurchaseOrderBook, PurchaseOrderLine};
pub use rma::{strip_html, PoItemOption, PoItemRate, PurchaseOrderService, ReturnAuthorization};
