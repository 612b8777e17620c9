mod registry;
mod selectors;

pub use registry::{humanize_tag, normalize_tag, LabelKind, LabelSpec, StyleCatalog};
pub use selectors::{LabelSelection, LabelSelector};
