// src/routes.rs

use axum::{
    Router,
    http::{HeaderValue, Method, header},
    middleware,
    routing::{delete, get, post},
};
use tower::ServiceBuilder;
use tower_http::{cors::CorsLayer, trace::TraceLayer};

use crate::{
    handlers::{auth, friend_requests, interaction, logs, posts, relations, stories, students},
    state::AppState,
    utils::jwt::auth_middleware,
};

/// Assembles the main application router.
///
/// * Auth routes are public; everything else sits behind the JWT middleware.
/// * Applies global middleware (Trace, CORS).
/// * Injects global state (store, config, recency formatter).
pub fn create_router(state: AppState) -> Router {
    let origins = [
        HeaderValue::from_static("http://localhost:3000"),
        HeaderValue::from_static("http://127.0.0.1:3000"),
    ];

    let cors = CorsLayer::new()
        .allow_origin(origins)
        .allow_methods([Method::GET, Method::POST, Method::PUT, Method::DELETE])
        .allow_headers([header::AUTHORIZATION, header::CONTENT_TYPE]);

    let auth_routes = Router::new()
        .route("/register", post(auth::register))
        .route("/login", post(auth::login));

    let student_routes = Router::new()
        .route("/me", get(students::get_me).put(students::update_me))
        .route("/me/blocked", get(relations::blocked))
        .route("/best-popularity", get(students::best_popularity))
        .route("/{id}", get(students::get_student))
        .route("/{id}/posts", get(students::student_posts))
        .route("/{id}/highlights", get(students::highlights))
        .route(
            "/{id}/follow",
            post(relations::follow).delete(relations::unfollow),
        )
        .route("/{id}/followers", get(relations::followers))
        .route("/{id}/following", get(relations::following))
        .route(
            "/{id}/block",
            post(relations::block).delete(relations::unblock),
        );

    let post_routes = Router::new()
        .route("/", post(posts::create_post))
        .route("/feed", get(posts::feed))
        .route("/popular", get(posts::popular))
        .route(
            "/{id}",
            get(posts::get_post)
                .put(posts::update_post)
                .delete(posts::delete_post),
        )
        .route("/{id}/archive", post(posts::archive_post))
        .route("/{id}/unarchive", post(posts::unarchive_post))
        .route("/{id}/like", post(interaction::like_post))
        .route(
            "/{id}/comments",
            get(interaction::list_post_comments).post(interaction::comment_post),
        );

    let story_routes = Router::new()
        .route("/", post(stories::create_story))
        .route("/feed", get(stories::feed))
        .route("/popular", get(stories::popular))
        .route("/{id}", delete(stories::delete_story))
        .route("/{id}/extend", post(stories::extend_story))
        .route("/{id}/feature", post(stories::feature_story))
        .route("/{id}/view", post(stories::view_story))
        .route("/{id}/like", post(interaction::like_story))
        .route(
            "/{id}/comments",
            get(interaction::list_story_comments).post(interaction::comment_story),
        );

    let friend_request_routes = Router::new()
        .route("/received", get(friend_requests::received))
        .route("/sent", get(friend_requests::sent))
        .route("/{id}", delete(friend_requests::cancel))
        .route("/{id}/accept", post(friend_requests::accept))
        .route("/{id}/reject", post(friend_requests::reject));

    let protected_routes = Router::new()
        .nest("/students", student_routes)
        .nest("/posts", post_routes)
        .nest("/stories", story_routes)
        .nest("/friend-requests", friend_request_routes)
        .route("/comments/{id}", delete(interaction::delete_comment))
        .route("/logs", get(logs::list_logs))
        .route("/logs/{id}", delete(logs::delete_log))
        .route_layer(middleware::from_fn_with_state(
            state.clone(),
            auth_middleware,
        ));

    Router::new()
        .nest("/api/auth", auth_routes)
        .nest("/api", protected_routes)
        // Global Middleware (applied from outside in)
        .layer(
            ServiceBuilder::new()
                .layer(TraceLayer::new_for_http())
                .layer(cors),
        )
        .with_state(state)
}
