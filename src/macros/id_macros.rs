//! Identifier newtype macros for kernel entities
//!
//! Every entity the kernel hands out (resource types, resources, activities,
//! managers, work groups) is addressed by a dense index into the topology.

/// Macro for declaring an index-backed identifier newtype
///
/// # Example
/// ```ignore
/// define_id!(ResourceTypeId, "rt");
/// let id = ResourceTypeId::new(3);
/// assert_eq!(id.index(), 3);
/// assert_eq!(id.to_string(), "rt3");
/// ```
#[macro_export]
macro_rules! define_id {
    ($(#[$meta:meta])* $name:ident, $prefix:literal) => {
        $(#[$meta])*
        #[derive(
            Debug,
            Clone,
            Copy,
            PartialEq,
            Eq,
            Hash,
            PartialOrd,
            Ord,
            serde::Serialize,
            serde::Deserialize,
        )]
        pub struct $name(usize);

        impl $name {
            /// Create an identifier from a topology index
            pub const fn new(index: usize) -> Self {
                Self(index)
            }

            /// Get the topology index
            pub const fn index(self) -> usize {
                self.0
            }
        }

        impl std::fmt::Display for $name {
            fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
                write!(f, "{}{}", $prefix, self.0)
            }
        }
    };
}
