//! System prompt assembly.
//!
//! # Layers (in prompt order)
//!
//! | Layer | Source | Present when |
//! |-------|--------|--------------|
//! | 1. Base personality | fixed text | always |
//! | 2. Personality | user settings | override is non-empty |
//! | 3. Response style | user settings | style is not `balanced` |
//! | 4. Mode | built-in table or custom mode | mode is set and resolves |
//! | 5. Global memory | request field | client sent a prompt |
//! | 6. Long-term memory | memory store | user has memories |
//! | 7. Semantic recall | recall service | workspace set, query long enough, hits |
//! | 8. Tool notice | tool registry | tools enabled |

pub mod assembler;
pub mod modes;

pub use assembler::{AssembledContext, AssemblyInput, ContextAssembler, Layer, LayerKind};
