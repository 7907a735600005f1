use std::collections::HashSet;

use sqlparser::ast::Query;

use crate::parser::names::normalize_ident;

struct Frame {
    /// CTE names a table factor directly inside this query resolves to.
    visible: HashSet<String>,
    /// Names visible inside each CTE body of this query, in declaration order.
    bodies: Vec<HashSet<String>>,
    next_body: usize,
}

/// CTE names in scope while a visitor walks nested queries.
///
/// Call [`enter`](Self::enter) from `pre_visit_query` and
/// [`exit`](Self::exit) from `post_visit_query`. A CTE name is only bound
/// inside the query that declares it: its main body, the CTE bodies declared
/// after it, and its own body when the `WITH` is recursive. Subqueries
/// inherit the names bound around them. A table of the same name anywhere
/// else is a real table.
#[derive(Default)]
pub(crate) struct CteScopes {
    stack: Vec<Frame>,
}

impl CteScopes {
    pub(crate) fn enter(&mut self, query: &Query) {
        // CTE bodies are the first child queries visited under their query.
        let inherited = match self.stack.last_mut() {
            Some(frame) if frame.next_body < frame.bodies.len() => {
                frame.next_body += 1;
                frame.bodies[frame.next_body - 1].clone()
            }
            Some(frame) => frame.visible.clone(),
            None => HashSet::new(),
        };

        let mut visible = inherited;
        let mut bodies = Vec::new();
        if let Some(with) = &query.with {
            for cte in &with.cte_tables {
                let name = normalize_ident(&cte.alias.name);
                let mut body = visible.clone();
                if with.recursive {
                    body.insert(name.clone());
                }
                bodies.push(body);
                visible.insert(name);
            }
        }
        self.stack.push(Frame {
            visible,
            bodies,
            next_body: 0,
        });
    }

    pub(crate) fn exit(&mut self) {
        self.stack.pop();
    }

    /// True when `name` refers to a CTE from the innermost query entered.
    pub(crate) fn is_cte(&self, name: &str) -> bool {
        self.stack
            .last()
            .is_some_and(|frame| frame.visible.contains(name))
    }
}
