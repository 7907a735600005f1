/// Filter-clause injection over the statement tree.
pub mod inject;
/// `SecurityRewriter` and row condition inputs.
pub mod security;
