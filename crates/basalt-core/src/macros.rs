/// Construct a [`Document`](crate::Document) from literal fields.
///
/// Values may be scalars (including negative number literals), nested
/// `{ ... }` documents, or `[ ... ]` arrays. Other expressions need
/// parentheses: `doc! { "at": (Utc::now()) }`.
///
/// ```
/// use basalt_core::doc;
/// let d = doc! { "name": "Ada", "tags": ["math", "code"], "meta": { "n": 1 } };
/// assert_eq!(d.get_str("name"), Some("Ada"));
/// ```
#[macro_export]
macro_rules! doc {
    () => { $crate::Document::new() };
    ( $($tt:tt)+ ) => {{
        let mut doc = $crate::Document::new();
        $crate::doc_fields!(doc; $($tt)+);
        doc
    }};
}

#[doc(hidden)]
#[macro_export]
macro_rules! doc_fields {
    ($doc:ident; ) => {};
    ($doc:ident; $key:literal : - $val:literal $(, $($rest:tt)*)?) => {
        $doc.set($key, $crate::Value::from(- $val));
        $crate::doc_fields!($doc; $($($rest)*)?);
    };
    ($doc:ident; $key:literal : $val:tt $(, $($rest:tt)*)?) => {
        $doc.set($key, $crate::val!($val));
        $crate::doc_fields!($doc; $($($rest)*)?);
    };
}

/// Construct an array [`Value`](crate::Value) from literal elements.
#[macro_export]
macro_rules! arr {
    () => { $crate::Value::Array(Vec::new()) };
    ( $($tt:tt)+ ) => {{
        let mut items: Vec<$crate::Value> = Vec::new();
        $crate::arr_items!(items; $($tt)+);
        $crate::Value::Array(items)
    }};
}

#[doc(hidden)]
#[macro_export]
macro_rules! arr_items {
    ($items:ident; ) => {};
    ($items:ident; - $val:literal $(, $($rest:tt)*)?) => {
        $items.push($crate::Value::from(- $val));
        $crate::arr_items!($items; $($($rest)*)?);
    };
    ($items:ident; $val:tt $(, $($rest:tt)*)?) => {
        $items.push($crate::val!($val));
        $crate::arr_items!($items; $($($rest)*)?);
    };
}

/// Convert one literal token tree into a [`Value`](crate::Value).
#[macro_export]
macro_rules! val {
    (null) => { $crate::Value::Null };
    (true) => { $crate::Value::Bool(true) };
    (false) => { $crate::Value::Bool(false) };
    ([ $($tt:tt)* ]) => { $crate::arr!($($tt)*) };
    ({ $($tt:tt)* }) => { $crate::Value::Document($crate::doc! { $($tt)* }) };
    ($other:expr) => { $crate::Value::from($other) };
}

#[cfg(test)]
mod tests {
    use crate::Value;

    #[test]
    fn scalar_fields() {
        let d = doc! { "a": 1, "b": 2.5, "c": "s", "d": true, "e": null, "f": -7 };
        assert_eq!(d.get("a"), Some(&Value::Int(1)));
        assert_eq!(d.get("b"), Some(&Value::Double(2.5)));
        assert_eq!(d.get("c"), Some(&Value::String("s".into())));
        assert_eq!(d.get("d"), Some(&Value::Bool(true)));
        assert_eq!(d.get("e"), Some(&Value::Null));
        assert_eq!(d.get("f"), Some(&Value::Int(-7)));
    }

    #[test]
    fn nested_documents_and_arrays() {
        let d = doc! {
            "who": { "name": "Ada", "age": 36 },
            "tags": ["a", "b", [1, -2]],
        };
        let who = d.get_document("who").unwrap();
        assert_eq!(who.get_i64("age"), Some(36));
        let tags = d.get_array("tags").unwrap();
        assert_eq!(tags.len(), 3);
        assert_eq!(tags[2], Value::Array(vec![Value::Int(1), Value::Int(-2)]));
    }

    #[test]
    fn parenthesized_expressions() {
        let n = 40;
        let d = doc! { "answer": (n + 2) };
        assert_eq!(d.get_i64("answer"), Some(42));
    }

    #[test]
    fn empty_document() {
        assert!(doc! {}.is_empty());
    }
}
