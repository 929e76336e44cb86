//! Query-string builder for the table API (PostgREST syntax).

/// Ordered list of query parameters.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Query {
    params: Vec<(String, String)>,
}

impl Query {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn select(columns: &str) -> Self {
        Self::new().param("select", columns)
    }

    fn param(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.params.push((key.into(), value.into()));
        self
    }

    pub fn eq(self, column: &str, value: impl AsRef<str>) -> Self {
        let value = format!("eq.{}", value.as_ref());
        self.param(column, value)
    }

    pub fn is_null(self, column: &str) -> Self {
        self.param(column, "is.null")
    }

    pub fn not_null(self, column: &str) -> Self {
        self.param(column, "not.is.null")
    }

    /// `column` is one of `values`.
    pub fn in_list<I, S>(self, column: &str, values: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let list = in_list(values);
        self.param(column, format!("in.{}", list))
    }

    /// Disjunction of raw filter expressions, e.g. `sender_id.eq.x`.
    pub fn or<I, S>(self, expressions: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let joined: Vec<String> = expressions
            .into_iter()
            .map(|e| e.as_ref().to_string())
            .collect();
        self.param("or", format!("({})", joined.join(",")))
    }

    /// Any of `columns` equals `value`.
    pub fn any_eq(self, columns: &[&str], value: &str) -> Self {
        let value = quote(value);
        self.or(columns.iter().map(|c| format!("{}.eq.{}", c, value)))
    }

    /// Case-insensitive substring match of `needle` on any of `columns`.
    pub fn search(self, columns: &[&str], needle: &str) -> Self {
        let pattern = quote(&format!("*{}*", needle));
        self.or(columns.iter().map(|c| format!("{}.ilike.{}", c, pattern)))
    }

    /// Adds an ordering term; later calls break ties of earlier ones.
    pub fn order(mut self, column: &str, ascending: bool) -> Self {
        let term = format!("{}.{}", column, if ascending { "asc" } else { "desc" });
        match self.params.iter_mut().find(|(k, _)| k == "order") {
            Some((_, value)) => {
                value.push(',');
                value.push_str(&term);
            }
            None => self.params.push(("order".to_string(), term)),
        }
        self
    }

    pub fn limit(self, limit: usize) -> Self {
        self.param("limit", limit.to_string())
    }

    pub fn params(&self) -> &[(String, String)] {
        &self.params
    }
}

/// `(a,b,c)` with each value quoted when needed.
pub fn in_list<I, S>(values: I) -> String
where
    I: IntoIterator<Item = S>,
    S: AsRef<str>,
{
    let quoted: Vec<String> = values.into_iter().map(|v| quote(v.as_ref())).collect();
    format!("({})", quoted.join(","))
}

/// Double-quotes a filter value containing reserved characters.
fn quote(value: &str) -> String {
    let reserved = |c: char| matches!(c, ',' | '.' | ':' | '(' | ')' | '"' | '\\' | ' ');
    if !value.contains(reserved) {
        return value.to_string();
    }
    let escaped = value.replace('\\', "\\\\").replace('"', "\\\"");
    format!("\"{}\"", escaped)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn rendered(query: &Query) -> Vec<(&str, &str)> {
        query
            .params()
            .iter()
            .map(|(k, v)| (k.as_str(), v.as_str()))
            .collect()
    }

    #[test]
    fn builds_filters_in_order() {
        let query = Query::select("*")
            .eq("user_id", "u-1")
            .is_null("archived_at")
            .order("created_at", false)
            .order("id", false)
            .limit(100);

        assert_eq!(
            rendered(&query),
            vec![
                ("select", "*"),
                ("user_id", "eq.u-1"),
                ("archived_at", "is.null"),
                ("order", "created_at.desc,id.desc"),
                ("limit", "100"),
            ]
        );
    }

    #[test]
    fn search_quotes_reserved_characters() {
        let query = Query::new().search(&["title", "description"], "red, blue");
        assert_eq!(
            rendered(&query),
            vec![(
                "or",
                "(title.ilike.\"*red, blue*\",description.ilike.\"*red, blue*\")"
            )]
        );

        let plain = Query::new().search(&["title"], "lamp");
        assert_eq!(rendered(&plain), vec![("or", "(title.ilike.*lamp*)")]);
    }

    #[test]
    fn any_eq_quotes_the_value() {
        let query = Query::new().any_eq(&["sender_id", "receiver_id"], "u-1");
        assert_eq!(
            rendered(&query),
            vec![("or", "(sender_id.eq.u-1,receiver_id.eq.u-1)")]
        );

        let odd = Query::new().any_eq(&["sender_id", "receiver_id"], "a,b.c");
        assert_eq!(
            rendered(&odd),
            vec![("or", "(sender_id.eq.\"a,b.c\",receiver_id.eq.\"a,b.c\")")]
        );
    }

    #[test]
    fn in_list_renders_parenthesised() {
        let query = Query::new().in_list("item_id", ["a", "b"]);
        assert_eq!(rendered(&query), vec![("item_id", "in.(a,b)")]);
    }
}
