pub mod format;
pub mod numeric;
pub mod status;
pub mod views;

pub use format::{
    format_defi_record, format_product, format_top_product, transaction_row, vault_activity_row, DefiRecord,
    DefiRecordRaw, Product, ProductRaw, TopProduct, TopProductRaw, TransactionRow,
};
pub use status::{classify_status, product_status, OrderStatus};
pub use views::{
    filter_by_currency, filter_by_order_id, filter_by_status, paginate, sum_amount, Page, Tab,
};
