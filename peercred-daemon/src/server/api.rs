use std::fmt;
use std::net::SocketAddr;

use axum::body::Body;
use axum::extract::{ConnectInfo, Request, State};
use axum::response::{IntoResponse, Response};
use axum::Json;
use log::{debug, error, warn};
use peercred_common::{V1Query, V1Response};

use crate::core::auth::{authorize, Decision};
use crate::core::connections::find;
use crate::core::domain::ConnectionRecord;
use crate::core::process::CredentialExtractor;
use crate::logger::QueryLog;
use crate::server::error::QueryError;
use crate::state::AppState;

/// Progress of one query through the pipeline
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Stage {
    Received,
    Authorized,
    Parsed,
    Matched,
    Resolved,
    Responded,
}

impl fmt::Display for Stage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Stage::Received => "received",
            Stage::Authorized => "authorized",
            Stage::Parsed => "parsed",
            Stage::Matched => "matched",
            Stage::Resolved => "resolved",
            Stage::Responded => "responded",
        };
        f.write_str(name)
    }
}

/// Terminal failure: the last stage reached and why the next one failed
#[derive(Debug)]
pub struct Failure {
    pub stage: Stage,
    pub error: QueryError,
}

impl Failure {
    fn at(stage: Stage) -> impl FnOnce(QueryError) -> Failure {
        move |error| Failure { stage, error }
    }
}

/// Largest request body read from an admitted caller
pub const MAX_QUERY_BODY: usize = 64 * 1024;

/// A successful query together with the connection it was answered from
#[derive(Debug)]
pub struct Answer {
    pub connection: ConnectionRecord,
    pub pid: u32,
    pub response: V1Response,
}

/// `POST /v1/query`
pub async fn v1_query(
    State(state): State<AppState>,
    ConnectInfo(client): ConnectInfo<SocketAddr>,
    request: Request,
) -> Response {
    let mut log = QueryLog::new(client);

    match run_query(&state, &mut log, client, request.into_body()).await {
        Ok(answer) => {
            let rendered = serde_json::to_string(&answer.response).unwrap_or_default();
            log.info(format_args!(
                "Query {} pid={} response={}",
                Stage::Responded,
                answer.pid,
                rendered
            ));
            Json(answer.response).into_response()
        }
        Err(failure) => {
            let context = log.context();
            match &failure.error {
                QueryError::Unauthorized(_) => warn!("{} Client port not privileged", context),
                QueryError::NotFound => debug!("{} Connection not found", context),
                e => error!("{} Query failed after stage {}: {}", context, failure.stage, e),
            }
            failure.error.into_response()
        }
    }
}

/// Run one query from the raw body to a response. No retries; the first
/// failing stage ends the query.
///
/// The body is not read until the caller has been admitted.
pub async fn run_query(
    state: &AppState,
    log: &mut QueryLog,
    client: SocketAddr,
    body: Body,
) -> Result<Answer, Failure> {
    if authorize(client.port()) == Decision::Reject {
        return Err(Failure { stage: Stage::Received, error: QueryError::Unauthorized(client.port()) });
    }

    let body = axum::body::to_bytes(body, MAX_QUERY_BODY)
        .await
        .map_err(|e| QueryError::MalformedRequest(format!("cannot read body: {}", e)))
        .map_err(Failure::at(Stage::Authorized))?;

    let query: V1Query = serde_json::from_slice(&body)
        .map_err(|e| QueryError::MalformedRequest(e.to_string()))
        .map_err(Failure::at(Stage::Authorized))?;
    log.with_query(&query);

    let connections = state.connections.clone();
    let processes = state.processes.clone();
    let names = state.names.clone();
    let lookup_log = log.clone();

    let lookup = tokio::task::spawn_blocking(move || -> Result<Answer, Failure> {
        let connection = find(&*connections, query.local_addr, query.remote_addr)
            .map_err(QueryError::from)
            .and_then(|found| found.ok_or(QueryError::NotFound))
            .map_err(Failure::at(Stage::Parsed))?;
        lookup_log.trace(format_args!("Connection found {:?}", connection));

        let pid = connection
            .pid
            .ok_or_else(|| {
                QueryError::ProcessNotFound(format!("socket inode {} has no visible owner", connection.inode))
            })
            .map_err(Failure::at(Stage::Matched))?;

        let credentials = CredentialExtractor::new(&*processes, &*names)
            .extract(pid)
            .map_err(QueryError::from)
            .map_err(Failure::at(Stage::Matched))?;
        lookup_log.trace(format_args!("Credentials {} for pid {}", Stage::Resolved, pid));

        Ok(Answer {
            connection,
            pid,
            response: V1Response {
                user: credentials.user,
                groups: credentials.groups,
                supplementary_groups: credentials.supplementary_groups,
            },
        })
    });

    // The blocking read keeps running after a timeout; its result is dropped
    match tokio::time::timeout(state.lookup_timeout, lookup).await {
        Ok(Ok(answer)) => answer,
        Ok(Err(join_error)) => Err(Failure {
            stage: Stage::Parsed,
            error: QueryError::Internal(format!("lookup task failed: {}", join_error)),
        }),
        Err(_) => Err(Failure {
            stage: Stage::Parsed,
            error: QueryError::Internal(format!("lookup timed out after {:?}", state.lookup_timeout)),
        }),
    }
}
