//! RSim Kernel Macros
//!
//! Declarative macros shared by the kernel modules.

#[macro_use]
pub mod id_macros;
