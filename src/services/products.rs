use crate::{db::DbPool, entities::product, errors::ServiceError, webhooks::CartLine};
use sea_orm::sea_query::{Expr, Func, LikeExpr};
use sea_orm::{ColumnTrait, EntityTrait, QueryFilter, QueryOrder};
use std::sync::Arc;
use tracing::instrument;

/// Maps cart lines back to authoritative catalog rows.
///
/// The cart snapshot in a payment event is a point-in-time copy that can
/// outlive catalog renames, so resolution degrades gracefully: id, then exact
/// name, then case-insensitive substring. Losing a line is preferable to
/// losing the whole order.
#[derive(Clone)]
pub struct ProductCatalogService {
    db: Arc<DbPool>,
}

impl ProductCatalogService {
    pub fn new(db: Arc<DbPool>) -> Self {
        Self { db }
    }

    /// Resolves a cart line to a catalog product, or `None` when nothing
    /// matches.
    ///
    /// Shipping pseudo-lines never reach this method; the caller filters them
    /// before resolution so they cannot produce a not-found warning.
    #[instrument(skip(self))]
    pub async fn resolve_line(&self, line: &CartLine) -> Result<Option<product::Model>, ServiceError> {
        if let Some(id) = line.id {
            if let Ok(id) = i32::try_from(id) {
                if let Some(found) = product::Entity::find_by_id(id).one(&*self.db).await? {
                    return Ok(Some(found));
                }
            }
            // The id missed the catalog; only the substring fallback remains
            return match line.name.as_deref() {
                Some(name) => self.find_by_name_fragment(name).await,
                None => Ok(None),
            };
        }

        let name = match line.name.as_deref() {
            Some(name) => name,
            None => return Ok(None),
        };

        if let Some(found) = product::Entity::find()
            .filter(product::Column::Name.eq(name))
            .one(&*self.db)
            .await?
        {
            return Ok(Some(found));
        }

        self.find_by_name_fragment(name).await
    }

    /// Case-insensitive substring match on product name; first match wins,
    /// ordered by id so the result is stable.
    async fn find_by_name_fragment(
        &self,
        fragment: &str,
    ) -> Result<Option<product::Model>, ServiceError> {
        let pattern = format!("%{}%", escape_like(&fragment.to_lowercase()));
        let found = product::Entity::find()
            .filter(
                Expr::expr(Func::lower(Expr::col(product::Column::Name)))
                    .like(LikeExpr::new(pattern).escape('\\')),
            )
            .order_by_asc(product::Column::Id)
            .one(&*self.db)
            .await?;

        Ok(found)
    }
}

/// Captured names are data, not patterns: `%`, `_`, and the escape character
/// itself must match literally.
fn escape_like(fragment: &str) -> String {
    let mut escaped = String::with_capacity(fragment.len());
    for c in fragment.chars() {
        if matches!(c, '%' | '_' | '\\') {
            escaped.push('\\');
        }
        escaped.push(c);
    }
    escaped
}
