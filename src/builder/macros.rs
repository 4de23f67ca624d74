//! Macros for ergonomic dispatch.

/// Build an argument list from JSON-like expressions.
///
/// Each element goes through [`serde_json::json!`], so literals, variables
/// and inline objects all work.
///
/// # Example
///
/// ```
/// use waypoint::args;
/// use serde_json::json;
///
/// let name = "alice";
/// let args = args![1, "two", name, { "k": [3] }];
/// assert_eq!(args, vec![json!(1), json!("two"), json!("alice"), json!({ "k": [3] })]);
/// assert!(args![].is_empty());
/// ```
#[macro_export]
macro_rules! args {
    ($($arg:tt)*) => {
        match $crate::__serde_json::json!([$($arg)*]) {
            $crate::__serde_json::Value::Array(args) => args,
            _ => ::std::vec::Vec::new(),
        }
    };
}
