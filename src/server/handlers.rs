//! Admin and customer operation handlers
//!
//! Every request lands in [`handle_request`]: the gate admits or rejects,
//! then the action is routed by role. Handlers return `Result<Response,
//! RelayError>` and the single exit point converts errors into same-shape
//! error responses with the session token echoed back.

use std::sync::Arc;

use chrono::Utc;

use crate::auth::Admission;
use crate::models::{Role, Signal};
use crate::protocol::{MaskedKey, RecentSignal, Request, Response, SystemStats};
use crate::registry::validation::{require, validate_signal_payload};
use crate::registry::RelayError;

use super::AppState;

/// Authenticate, route and execute one decoded request
pub async fn handle_request(state: &Arc<AppState>, request: Request) -> Response {
    let role = match request.role {
        Some(role) => role,
        None => {
            return Response::error(&RelayError::MalformedRequest(
                "missing field: role".to_string(),
            ))
        }
    };
    let id = match request.id.as_deref() {
        Some(id) if !id.is_empty() => id.to_string(),
        _ => {
            return Response::error(&RelayError::MalformedRequest(
                "missing field: id".to_string(),
            ))
        }
    };

    let admission = match state.gate.admit(
        role,
        &id,
        request.secret_key.as_deref(),
        request.session_token.as_deref(),
    ) {
        Ok(admission) => admission,
        Err(rejection) => {
            tracing::warn!("🚫 {} {} rejected: {}", role, id, rejection.error.code());
            // A rate-limited request still authenticated, so its session is
            // echoed for reuse once the window clears
            let response = Response::error(&rejection.error);
            return match rejection.session_token {
                Some(token) => response.with_session(token),
                None => response,
            };
        }
    };

    if admission.session_created && role == Role::Admin {
        record_activity(state, &admission.identity_id, "login", "api key authentication").await;
    }

    let token = admission.session_token.clone();
    let result = match (role, request.action.as_str()) {
        (Role::Admin, "send_signal") => handle_send_signal(state, &admission, &request).await,
        (Role::Admin, "get_stats") => handle_get_stats(state),
        (Role::Admin, "add_api_key") => handle_add_api_key(state, &admission, &request).await,
        (Role::Admin, "set_user_status") => {
            handle_set_user_status(state, &admission, &request).await
        }
        (Role::Admin, "revoke_api_key") => {
            handle_revoke_api_key(state, &admission, &request).await
        }
        (Role::Admin, "list_api_keys") => handle_list_api_keys(state),
        (Role::Admin, "reset_delivery") => handle_reset_delivery(state, &admission, &request).await,
        (Role::Customer, "check_signal") => handle_check_signal(state, &admission).await,
        (Role::Customer, "get_all_signals") => handle_get_all_signals(state, &admission),
        (_, action) => Err(RelayError::MalformedRequest(format!(
            "unsupported action for {}: {}",
            role, action
        ))),
    };

    match result {
        Ok(response) => response.with_session(token),
        Err(err) => {
            if matches!(err, RelayError::Storage(_) | RelayError::Internal(_)) {
                tracing::error!("❌ {} {} failed: {:?}", role, request.action, err);
            }
            Response::error(&err).with_session(token)
        }
    }
}

// ============================================================================
// Admin operations
// ============================================================================

async fn handle_send_signal(
    state: &Arc<AppState>,
    admission: &Admission,
    request: &Request,
) -> Result<Response, RelayError> {
    let payload = validate_signal_payload(
        request.symbol.as_deref(),
        request.side.as_deref(),
        request.entry,
        request.sl,
        request.tp,
    )?;

    let ttl = request
        .ttl_minutes
        .unwrap_or(state.config.default_ttl_minutes);
    if ttl <= 0 {
        return Err(RelayError::ValidationFailed(
            "ttl_minutes must be positive".to_string(),
        ));
    }

    let signal = Signal::new(
        payload.symbol,
        payload.side,
        payload.entry,
        payload.stop_loss,
        payload.take_profit,
        ttl,
        admission.identity_id.clone(),
    );
    let published = signal.clone();

    let (active_count, evicted) = state.registry.publish(signal);

    tracing::info!(
        "📡 new signal {} from {}: {} {:?} entry={} sl={} tp={} ({} active)",
        published.signal_id,
        admission.identity_id,
        published.symbol,
        published.side,
        published.entry_price,
        published.stop_loss,
        published.take_profit,
        active_count
    );
    if let Some(old) = evicted {
        // Capacity eviction is a silent drop for the admin, log-only
        tracing::info!("🧹 capacity eviction: dropped oldest signal {}", old.signal_id);
    }

    if let Some(audit) = &state.audit {
        if let Err(e) = audit.record_signal(&published).await {
            tracing::warn!("⚠️  audit signal write failed: {}", e);
        }
    }
    record_activity(
        state,
        &admission.identity_id,
        "send_signal",
        &format!("{} {:?} at {}", published.symbol, published.side, published.entry_price),
    )
    .await;

    Ok(Response::success()
        .with_message("signal accepted")
        .with_signal(published)
        .with_active_count(active_count))
}

fn handle_get_stats(state: &Arc<AppState>) -> Result<Response, RelayError> {
    let registry_stats = state.registry.stats();
    let now = Utc::now();

    let recent_signals = registry_stats
        .recent_signals
        .iter()
        .map(|signal| RecentSignal {
            signal_id: signal.signal_id.clone(),
            symbol: signal.symbol.clone(),
            side: signal.side,
            age_seconds: signal.age_seconds(now),
            expires_in_seconds: signal.expires_in_seconds(now),
            created_by: signal.created_by.clone(),
        })
        .collect();

    let stats = SystemStats {
        uptime_seconds: state.uptime_seconds(),
        active_signals: registry_stats.active_signals,
        customers_served: registry_stats.customers_served,
        total_deliveries: registry_stats.total_deliveries,
        active_connections: state.connections.active(),
        max_connections: state.config.max_connections,
        active_sessions: state.sessions.len(),
        rate_limited_identities: state.rate_limiter.tracked_identities(),
        recent_signals,
    };

    Ok(Response::success().with_stats(stats))
}

async fn handle_add_api_key(
    state: &Arc<AppState>,
    admission: &Admission,
    request: &Request,
) -> Result<Response, RelayError> {
    let target_role = require(request.target_role, "target_role")?;
    let target_id = require(request.target_id.clone(), "target_id")?;
    let new_secret = require(request.new_secret.clone(), "new_secret")?;

    let store = Arc::clone(&state.credentials);
    let (id, secret) = (target_id.clone(), new_secret);
    tokio::task::spawn_blocking(move || store.add(target_role, &id, &secret))
        .await
        .map_err(|e| RelayError::Internal(format!("credential task failed: {}", e)))??;

    tracing::info!("🔐 {} added {} {}", admission.identity_id, target_role, target_id);
    record_activity(
        state,
        &admission.identity_id,
        "add_api_key",
        &format!("{} {}", target_role, target_id),
    )
    .await;

    Ok(Response::success().with_message(format!("{} {} added", target_role, target_id)))
}

async fn handle_set_user_status(
    state: &Arc<AppState>,
    admission: &Admission,
    request: &Request,
) -> Result<Response, RelayError> {
    let target_role = require(request.target_role, "target_role")?;
    let target_id = require(request.target_id.clone(), "target_id")?;
    let status = require(request.status, "status")?;

    let store = Arc::clone(&state.credentials);
    let id = target_id.clone();
    tokio::task::spawn_blocking(move || store.set_status(target_role, &id, status))
        .await
        .map_err(|e| RelayError::Internal(format!("credential task failed: {}", e)))??;

    record_activity(
        state,
        &admission.identity_id,
        "set_user_status",
        &format!("{} {} -> {:?}", target_role, target_id, status),
    )
    .await;

    Ok(Response::success().with_message(format!("{} {} status updated", target_role, target_id)))
}

async fn handle_revoke_api_key(
    state: &Arc<AppState>,
    admission: &Admission,
    request: &Request,
) -> Result<Response, RelayError> {
    let target_role = require(request.target_role, "target_role")?;
    let target_id = require(request.target_id.clone(), "target_id")?;

    let store = Arc::clone(&state.credentials);
    let id = target_id.clone();
    tokio::task::spawn_blocking(move || store.revoke(target_role, &id))
        .await
        .map_err(|e| RelayError::Internal(format!("credential task failed: {}", e)))??;

    tracing::info!("🔐 {} revoked {} {}", admission.identity_id, target_role, target_id);
    record_activity(
        state,
        &admission.identity_id,
        "revoke_api_key",
        &format!("{} {}", target_role, target_id),
    )
    .await;

    Ok(Response::success().with_message(format!("{} {} revoked", target_role, target_id)))
}

fn handle_list_api_keys(state: &Arc<AppState>) -> Result<Response, RelayError> {
    let mut keys = Vec::new();
    for role in [Role::Admin, Role::Customer] {
        for (id, masked, status) in state.credentials.list(role) {
            keys.push(MaskedKey {
                role,
                id,
                secret_key: masked,
                status,
            });
        }
    }
    Ok(Response::success().with_keys(keys))
}

async fn handle_reset_delivery(
    state: &Arc<AppState>,
    admission: &Admission,
    request: &Request,
) -> Result<Response, RelayError> {
    let customer_id = require(request.customer_id.clone(), "customer_id")?;
    let signal_id = require(request.signal_id.clone(), "signal_id")?;

    state.registry.reset_delivery(&customer_id, &signal_id)?;

    record_activity(
        state,
        &admission.identity_id,
        "reset_delivery",
        &format!("{} {}", customer_id, signal_id),
    )
    .await;

    Ok(Response::success().with_message(format!(
        "delivery of {} to {} reset",
        signal_id, customer_id
    )))
}

// ============================================================================
// Customer operations
// ============================================================================

async fn handle_check_signal(
    state: &Arc<AppState>,
    admission: &Admission,
) -> Result<Response, RelayError> {
    let (signals, active_count) = state.registry.poll_new(&admission.identity_id);

    if signals.is_empty() {
        return Ok(Response::success()
            .with_message("no new signals available")
            .with_signals(signals)
            .with_active_count(active_count));
    }

    tracing::info!(
        "🎯 customer {} received {} new signal(s)",
        admission.identity_id,
        signals.len()
    );
    if let Some(audit) = &state.audit {
        for delivered in &signals {
            if let Err(e) = audit
                .record_delivery(&admission.identity_id, &delivered.signal.signal_id)
                .await
            {
                tracing::warn!("⚠️  audit delivery write failed: {}", e);
            }
        }
    }

    Ok(Response::success()
        .with_signals(signals)
        .with_active_count(active_count))
}

fn handle_get_all_signals(
    state: &Arc<AppState>,
    admission: &Admission,
) -> Result<Response, RelayError> {
    let (signals, active_count) = state.registry.poll_all(&admission.identity_id);
    Ok(Response::success()
        .with_signals(signals)
        .with_active_count(active_count))
}

async fn record_activity(state: &Arc<AppState>, actor_id: &str, action: &str, details: &str) {
    if let Some(audit) = &state.audit {
        if let Err(e) = audit.record_activity(actor_id, action, details).await {
            tracing::warn!("⚠️  audit activity write failed: {}", e);
        }
    }
}
