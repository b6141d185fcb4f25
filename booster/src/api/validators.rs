use super::{
    response::{Failure, Reply},
    Context,
};
use crate::{
    store::Store,
    types::{QueueBoost, Validator},
};
use axum::{
    extract::{rejection::JsonRejection, Path, State},
    Json,
};
use serde::{Deserialize, Serialize};
use tracing::info;

/// Body of a successful mutation.
#[derive(Debug, Serialize)]
pub struct Done {
    pub message: &'static str,
}

/// Fields that `PUT /validators/{pubkey}` may change.
#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase", deny_unknown_fields)]
pub struct Update {
    pub operator_address: Option<String>,
    pub boost_threshold: Option<String>,
}

pub async fn list<S: Store>(
    State(context): State<Context<S>>,
) -> Result<Reply<Vec<Validator>>, Failure> {
    Ok(Reply(context.store.validators().await?))
}

pub async fn add<S: Store>(
    State(context): State<Context<S>>,
    body: Result<Json<Validator>, JsonRejection>,
) -> Result<Reply<Done>, Failure> {
    let Json(validator) = body?;
    validator.validate()?;
    let pubkey = validator.pubkey.clone();
    context.store.add_validator(validator).await?;
    info!(%pubkey, "validator added");
    Ok(Reply(Done {
        message: "validator added",
    }))
}

pub async fn update<S: Store>(
    State(context): State<Context<S>>,
    Path(pubkey): Path<String>,
    body: Result<Json<Update>, JsonRejection>,
) -> Result<Reply<Done>, Failure> {
    let Json(update) = body?;
    let Some(mut validator) = context.store.validator(&pubkey).await? else {
        return Err(Failure::bad_request(format!(
            "validator {pubkey} not found"
        )));
    };
    let previous = validator.operator().ok();
    if let Some(operator_address) = update.operator_address {
        validator.operator_address = operator_address;
    }
    if let Some(boost_threshold) = update.boost_threshold {
        validator.boost_threshold = boost_threshold;
    }
    validator.validate()?;
    // A pending queue can only be activated by the operator that queued it
    let operator_changed = Some(validator.operator()?) != previous;
    if operator_changed && context.store.queue_boost_exists(&pubkey).await? {
        return Err(Failure::bad_request(format!(
            "validator {pubkey} has a pending queue boost, operator address cannot change"
        )));
    }
    context.store.update_validator(validator).await?;
    info!(%pubkey, "validator updated");
    Ok(Reply(Done {
        message: "validator updated",
    }))
}

pub async fn delete<S: Store>(
    State(context): State<Context<S>>,
    Path(pubkey): Path<String>,
) -> Result<Reply<Done>, Failure> {
    context.store.delete_validator(&pubkey).await?;
    info!(%pubkey, "validator deleted");
    Ok(Reply(Done {
        message: "validator deleted",
    }))
}

/// Lists queue boosts that have not been activated yet.
pub async fn pending<S: Store>(
    State(context): State<Context<S>>,
) -> Result<Reply<Vec<QueueBoost>>, Failure> {
    Ok(Reply(context.store.pending_queue_boosts().await?))
}
