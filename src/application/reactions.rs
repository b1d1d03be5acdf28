use serde_json::{Value, json};
use tracing::debug;

use crate::{
    application::{
        context::{RequestContext, unix_now},
        error::AppError,
    },
    domain::{resources::Reaction, types::ReactionKind},
    infra::db::SqlValue,
};

/// Toggle the signed-in member's like or subscription on a piece of content.
///
/// Returns `{liked|subscribed: bool, total: n}` computed from the refreshed
/// snapshot.
pub async fn toggle(ctx: &mut RequestContext, kind: ReactionKind) -> Result<Value, AppError> {
    if ctx.member.is_guest() {
        return Err(AppError::authentication("sign in to react to content"));
    }
    let content_type = ctx
        .param("content_type")
        .map(str::to_ascii_lowercase)
        .ok_or_else(|| AppError::validation("`content_type` is required"))?;
    let content_id = ctx
        .param("content_id")
        .and_then(|id| id.trim().parse::<i64>().ok())
        .filter(|id| *id > 0)
        .ok_or_else(|| AppError::validation("`content_id` must be a positive integer"))?;
    let member_id = ctx.member.id;
    let table = kind.table();

    let data = ctx.data_mut()?;
    let reactions: Vec<Reaction> = data.cache.decode(table)?;
    let existing = reactions
        .iter()
        .find(|reaction| {
            reaction.member_id == member_id && reaction.targets(&content_type, content_id)
        })
        .map(|reaction| reaction.id);

    match existing {
        Some(id) => {
            data.builder.reset().delete(table).filter("id = ?", [id]);
        }
        None => {
            data.builder
                .reset()
                .insert(
                    table,
                    &["member_id", "content_type", "content_id", "created_at"],
                )
                .values([
                    SqlValue::from(member_id),
                    content_type.as_str().into(),
                    content_id.into(),
                    unix_now().into(),
                ]);
        }
    }
    data.commit(&[table]).await?;

    let reactions: Vec<Reaction> = data.cache.decode(table)?;
    let targeted = reactions
        .iter()
        .filter(|reaction| reaction.targets(&content_type, content_id));
    let active = targeted
        .clone()
        .any(|reaction| reaction.member_id == member_id);
    let total = targeted.count();

    debug!(
        target = "bulletin_fusion::application::reactions",
        request_id = %ctx.request_id,
        table,
        member_id,
        content_type = %content_type,
        content_id,
        active,
        total,
        "Reaction toggled"
    );

    let mut payload = json!({ "total": total });
    payload[kind.state_key()] = Value::Bool(active);
    Ok(payload)
}
