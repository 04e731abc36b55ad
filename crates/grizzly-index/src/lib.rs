//! Secondary indexes over table rows: an ordered B-tree per column (C5) and
//! a multi-column equality hash index (C6). Both index by [`RowId`], never
//! by pointer, so neither index nor table needs to know about the other's
//! memory layout.

pub mod btree;
pub mod composite;
pub mod key;

pub use btree::BTreeIndex;
pub use composite::CompositeHashIndex;
pub use key::OwnedKey;
