/*!
 * Data Structures
 *
 * Specialized data structures shared by the registry:
 * - Inline strings for object identifiers and error messages
 *
 * # Performance
 *
 * - Inline strings: Avoids heap allocation for strings ≤23 bytes, which
 *   covers nearly every device, line and channel identifier
 */

mod inline_string;

pub use inline_string::InlineString;
