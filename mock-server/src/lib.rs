use std::{
    collections::{BTreeMap, HashMap, HashSet},
    sync::Arc,
};

use axum::{
    extract::State,
    http::{header, HeaderMap, HeaderValue, StatusCode},
    response::{IntoResponse, Response},
    routing::post,
    Form, Json, Router,
};
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use tokio::{net::TcpListener, sync::RwLock};
use tower_http::trace::TraceLayer;
use uuid::Uuid;

pub const SESSION_COOKIE: &str = "session_id";

#[derive(Clone, Debug, Serialize, Deserialize, PartialEq)]
pub struct Recipe {
    pub id: u64,
    pub title: String,
    pub cook_time_minutes: u32,
    pub main_ingredient: String,
}

#[derive(Deserialize)]
pub struct LoginForm {
    #[serde(default)]
    pub username: String,
    #[serde(default)]
    pub password: String,
}

#[derive(Deserialize)]
pub struct RecipeForm {
    pub id: u64,
}

#[derive(Default)]
pub struct Backend {
    pub sessions: HashSet<String>,
    pub recipes: HashMap<u64, Recipe>,
}

pub type Db = Arc<RwLock<Backend>>;

pub fn seeded() -> Backend {
    let recipes = [
        Recipe {
            id: 1,
            title: "Shakshuka".to_string(),
            cook_time_minutes: 25,
            main_ingredient: "eggs".to_string(),
        },
        Recipe {
            id: 2,
            title: "Mushroom risotto".to_string(),
            cook_time_minutes: 40,
            main_ingredient: "arborio rice".to_string(),
        },
    ];
    Backend {
        sessions: HashSet::new(),
        recipes: recipes.into_iter().map(|r| (r.id, r)).collect(),
    }
}

pub fn app() -> Router {
    let db: Db = Arc::new(RwLock::new(seeded()));
    Router::new()
        .route("/api/login", post(login))
        .route("/api/logout", post(logout))
        .route("/api/recipes/get", post(get_recipe))
        .route("/api/echo", post(echo))
        .route("/api/broken", post(broken))
        .layer(TraceLayer::new_for_http())
        .with_state(db)
}

pub async fn run(listener: TcpListener) -> Result<(), std::io::Error> {
    axum::serve(listener, app()).await
}

fn envelope(message: &str, code: i64, data: Value) -> Json<Value> {
    Json(json!({ "message": message, "code": code, "data": data }))
}

fn session_of(headers: &HeaderMap) -> Option<String> {
    headers
        .get_all(header::COOKIE)
        .iter()
        .filter_map(|value| value.to_str().ok())
        .flat_map(cookie::Cookie::split_parse)
        .filter_map(Result::ok)
        .find(|cookie| cookie.name() == SESSION_COOKIE)
        .map(|cookie| cookie.value().to_string())
}

async fn login(State(db): State<Db>, Form(input): Form<LoginForm>) -> Response {
    if input.username.is_empty() || input.password.is_empty() {
        tracing::debug!("login rejected: missing credentials");
        return (
            StatusCode::BAD_REQUEST,
            envelope("username and password are required", 1, json!({})),
        )
            .into_response();
    }

    let session = Uuid::new_v4().to_string();
    db.write().await.sessions.insert(session.clone());
    tracing::info!(username = %input.username, "session opened");

    let mut response = envelope(
        "Welcome back",
        0,
        json!({ "user_id": 1, "display_name": input.username }),
    )
    .into_response();
    if let Ok(value) = HeaderValue::from_str(&format!("{SESSION_COOKIE}={session}; Path=/; HttpOnly")) {
        response.headers_mut().insert(header::SET_COOKIE, value);
    }
    response
}

async fn logout(State(db): State<Db>, headers: HeaderMap) -> Response {
    if let Some(session) = session_of(&headers) {
        db.write().await.sessions.remove(&session);
    }
    let mut response = envelope("Signed out", 0, json!({})).into_response();
    response.headers_mut().insert(
        header::SET_COOKIE,
        HeaderValue::from_static("session_id=; Path=/; Max-Age=0"),
    );
    response
}

async fn get_recipe(State(db): State<Db>, headers: HeaderMap, Form(input): Form<RecipeForm>) -> Response {
    let db = db.read().await;
    let authorized = session_of(&headers).is_some_and(|session| db.sessions.contains(&session));
    if !authorized {
        return (StatusCode::UNAUTHORIZED, Json(json!("login required"))).into_response();
    }
    match db.recipes.get(&input.id) {
        Some(recipe) => envelope("ok", 0, json!(recipe)).into_response(),
        None => (
            StatusCode::NOT_FOUND,
            envelope("recipe not found", 44, json!({ "id": input.id })),
        )
            .into_response(),
    }
}

/// Returns every form field, grouping repeated keys.
async fn echo(Form(fields): Form<Vec<(String, String)>>) -> Json<Value> {
    let mut grouped: BTreeMap<String, Vec<String>> = BTreeMap::new();
    for (key, value) in fields {
        grouped.entry(key).or_default().push(value);
    }
    envelope("ok", 0, json!({ "fields": grouped }))
}

async fn broken() -> (StatusCode, &'static str) {
    (StatusCode::OK, "OK")
}
