use std::sync::Arc;

use crate::error::Result;

use super::expr::{Expr, SqlWriter};
use super::helpers::{quote_ident, validate_label};

/// One entry of a select list: an expression and its result label.
#[derive(Debug, Clone, PartialEq)]
pub struct Selector {
    expr: Expr,
    alias: Option<Arc<str>>,
}

impl Selector {
    pub fn new(expr: Expr) -> Self {
        Selector { expr, alias: None }
    }

    pub fn column(source: &str, column: &str) -> Self {
        Self::new(Expr::column(source, column))
    }

    pub fn expr(&self) -> &Expr {
        &self.expr
    }

    /// Source alias when the selector reads a plain column.
    pub fn source(&self) -> Option<&str> {
        match &self.expr {
            Expr::Column { source, .. } => Some(source),
            _ => None,
        }
    }

    pub fn alias(&self) -> Option<&str> {
        self.alias.as_deref()
    }

    pub fn set_alias(mut self, alias: &str) -> Self {
        self.alias = Some(Arc::from(alias));
        self
    }

    pub(crate) fn render(&self, w: &mut SqlWriter<'_>) -> Result<()> {
        self.expr.render(w)?;
        if let Some(alias) = &self.alias {
            // aggregate labels are plain names, column labels are `alias.column`
            if alias.contains('.') {
                validate_label(alias)?;
            } else {
                super::helpers::validate_name(alias)?;
            }
            w.push(" AS ");
            w.push(&quote_ident(alias));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::sql::expr::ParamMap;

    fn sql(sel: &Selector) -> Result<String> {
        let params = ParamMap::new();
        let mut w = SqlWriter::new(&params);
        sel.render(&mut w)?;
        Ok(w.finish().0)
    }

    #[test]
    fn test_qualified_column() -> Result<()> {
        let sel = Selector::column("self", "id");
        assert_eq!(sel.source(), Some("self"));
        assert_eq!(sel.alias(), None);
        assert_eq!(sql(&sel)?, "`self`.`id`");
        Ok(())
    }

    #[test]
    fn test_labelled_column() -> Result<()> {
        let sel = Selector::column("self$author", "name").set_alias("self$author.name");
        assert_eq!(sql(&sel)?, "`self$author`.`name` AS `self$author.name`");
        Ok(())
    }

    #[test]
    fn test_aggregate_label() -> Result<()> {
        let sel = Selector::new(Expr::CountAll).set_alias("count");
        assert_eq!(sel.source(), None);
        assert_eq!(sql(&sel)?, "COUNT(*) AS `count`");
        Ok(())
    }

    #[test]
    fn test_invalid_labels_are_rejected() {
        assert!(sql(&Selector::column("self", "id").set_alias("bad alias")).is_err());
        assert!(sql(&Selector::column("self", "id").set_alias("`oops`")).is_err());
        assert!(sql(&Selector::column("se lf", "id")).is_err());
    }
}
