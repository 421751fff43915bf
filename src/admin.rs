//! Operator endpoints: health, engine status, and the dead-letter store.
//!
//! These routes carry no authentication of their own; bind them to an address only
//! operators can reach.

use crate::delivery::TaskId;
use crate::engine::{Engine, EngineErr, Redrive};

use std::convert::Infallible;
use std::sync::Arc;
use warp::http::StatusCode;
use warp::reply::{self, Reply};
use warp::{filters::BoxedFilter, path, Filter};

/// Helper macro to match on the first of any of the provided filters
macro_rules! any_of {
    ($filter:expr, $($other_filter:expr),*) => {
        $filter$(.or($other_filter).unify())*.boxed()
    };
}

pub fn routes(engine: Arc<Engine>) -> BoxedFilter<(reply::Response,)> {
    any_of!(
        health(),
        status(Arc::clone(&engine)),
        list_dead_letters(Arc::clone(&engine)),
        discard_dead_letter(Arc::clone(&engine)),
        redrive_dead_letter(engine)
    )
}

fn with_engine(engine: Arc<Engine>) -> impl Filter<Extract = (Arc<Engine>,), Error = Infallible> + Clone {
    warp::any().map(move || Arc::clone(&engine))
}

fn health() -> BoxedFilter<(reply::Response,)> {
    path!("api" / "v1" / "streaming" / "health")
        .and(warp::get())
        .map(|| "OK".into_response())
        .boxed()
}

fn status(engine: Arc<Engine>) -> BoxedFilter<(reply::Response,)> {
    path!("api" / "v1" / "fanout" / "status")
        .and(warp::get())
        .and(with_engine(engine))
        .map(|engine: Arc<Engine>| reply::json(&engine.stats()).into_response())
        .boxed()
}

fn list_dead_letters(engine: Arc<Engine>) -> BoxedFilter<(reply::Response,)> {
    path!("api" / "v1" / "fanout" / "dead_letters")
        .and(warp::get())
        .and(with_engine(engine))
        .map(|engine: Arc<Engine>| reply::json(&engine.dead_letters()).into_response())
        .boxed()
}

fn discard_dead_letter(engine: Arc<Engine>) -> BoxedFilter<(reply::Response,)> {
    path!("api" / "v1" / "fanout" / "dead_letters" / u64)
        .and(warp::delete())
        .and(with_engine(engine))
        .map(|id: u64, engine: Arc<Engine>| match engine.discard_dead_letter(TaskId(id)) {
            Some(letter) => reply::json(&letter).into_response(),
            None => not_found(id),
        })
        .boxed()
}

fn redrive_dead_letter(engine: Arc<Engine>) -> BoxedFilter<(reply::Response,)> {
    path!("api" / "v1" / "fanout" / "dead_letters" / u64 / "redrive")
        .and(warp::post())
        .and(with_engine(engine))
        .and_then(|id: u64, engine: Arc<Engine>| async move {
            let response = match engine.redrive_dead_letter(TaskId(id)).await {
                Ok(Redrive::Queued(task)) => reply::json(&task).into_response(),
                Ok(Redrive::AlreadyPending) => reply::with_status(
                    format!("delivery of dead letter {} is already pending", id),
                    StatusCode::CONFLICT,
                )
                .into_response(),
                Ok(Redrive::Missing) => not_found(id),
                Err(e @ EngineErr::Busy) | Err(e @ EngineErr::ShuttingDown) => {
                    reply::with_status(e.to_string(), StatusCode::SERVICE_UNAVAILABLE).into_response()
                }
                Err(e) => reply::with_status(e.to_string(), StatusCode::INTERNAL_SERVER_ERROR)
                    .into_response(),
            };
            Ok::<_, Infallible>(response)
        })
        .boxed()
}

fn not_found(id: u64) -> reply::Response {
    reply::with_status(format!("no dead letter {}", id), StatusCode::NOT_FOUND).into_response()
}
