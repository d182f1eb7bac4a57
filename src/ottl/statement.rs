//! OTTL statement representation.

/// One OTTL statement: exactly one editor call transforming the record, plus
/// the conditions under which it applies.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Statement {
    pub editor: String,
    pub conditions: Vec<String>,
}

impl Statement {
    pub fn new(editor: impl Into<String>) -> Self {
        Statement {
            editor: editor.into(),
            conditions: Vec::new(),
        }
    }

    pub fn when(mut self, condition: impl Into<String>) -> Self {
        let condition = condition.into();
        if !condition.is_empty() {
            self.conditions.push(condition);
        }
        self
    }

    /// Render as `<editor> where <c1> and <c2> ...`, or just the editor when
    /// there are no conditions.
    pub fn render(&self) -> String {
        let conditions: Vec<&str> = self
            .conditions
            .iter()
            .map(String::as_str)
            .filter(|c| !c.is_empty())
            .collect();

        if conditions.is_empty() {
            self.editor.clone()
        } else {
            format!("{} where {}", self.editor, conditions.join(" and "))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_render_without_conditions() {
        assert_eq!(
            Statement::new(r#"set(attributes["a"], "b")"#).render(),
            r#"set(attributes["a"], "b")"#
        );
    }

    #[test]
    fn test_render_joins_conditions_with_and() {
        let stmt = Statement::new("delete_key(attributes, \"a\")")
            .when("attributes[\"marker\"] == \"p-1\"")
            .when("attributes?.a != nil");
        assert_eq!(
            stmt.render(),
            "delete_key(attributes, \"a\") where attributes[\"marker\"] == \"p-1\" and attributes?.a != nil"
        );
    }

    #[test]
    fn test_empty_conditions_are_dropped() {
        let stmt = Statement::new("set(time, Time(body, \"%Y\"))").when("");
        assert_eq!(stmt.render(), "set(time, Time(body, \"%Y\"))");
    }
}
