// tests/social_tests.rs

mod common;

use common::spawn_app;
use serde_json::{Value, json};

#[tokio::test]
async fn follow_feeds_posts_and_writes_a_log() {
    let app = spawn_app().await;
    let ada = app.student("ada").await;
    let bora = app.student("bora").await;

    let follow_path = format!("/api/students/{}/follow", ada.id);
    assert_eq!(app.post(&bora, &follow_path, json!({})).await.status().as_u16(), 201);
    assert_eq!(app.post(&bora, &follow_path, json!({})).await.status().as_u16(), 409);

    let self_follow = app
        .post(&bora, &format!("/api/students/{}/follow", bora.id), json!({}))
        .await;
    assert_eq!(self_follow.status().as_u16(), 400);

    let post_id = app.create_post(&ada, &[]).await["id"].as_i64().unwrap();

    let feed: Vec<Value> = app
        .get(&bora, "/api/posts/feed?page=0&size=5")
        .await
        .json()
        .await
        .unwrap();
    assert_eq!(feed.len(), 1);
    assert_eq!(feed[0]["id"], post_id);

    let logs: Vec<Value> = app.get(&ada, "/api/logs").await.json().await.unwrap();
    assert_eq!(logs.len(), 1);
    assert_eq!(logs[0]["message"], "bora started following you");
    assert_eq!(logs[0]["time_ago"], "0 minutes ago");

    let followers: Vec<Value> = app
        .get(&bora, &format!("/api/students/{}/followers", ada.id))
        .await
        .json()
        .await
        .unwrap();
    assert_eq!(followers[0]["username"], "bora");

    let profile: Value = app
        .get(&bora, &format!("/api/students/{}", ada.id))
        .await
        .json()
        .await
        .unwrap();
    assert_eq!(profile["followers_count"], 1);
    assert_eq!(profile["is_following"], true);

    assert_eq!(app.delete(&bora, &follow_path).await.status().as_u16(), 204);
    assert_eq!(app.delete(&bora, &follow_path).await.status().as_u16(), 404);
}

async fn make_private(app: &common::TestApp, session: &common::Session) {
    let updated: Value = app
        .put(
            session,
            "/api/students/me",
            json!({ "is_private": true, "bio": "<script>x</script>Physics" }),
        )
        .await
        .json()
        .await
        .unwrap();
    assert_eq!(updated["is_private"], true);
    assert_eq!(updated["bio"], "Physics");
}

#[tokio::test]
async fn private_profiles_open_only_after_an_accepted_request() {
    let app = spawn_app().await;
    let ada = app.student("ada").await;
    let bora = app.student("bora").await;
    let cem = app.student("cem").await;
    make_private(&app, &ada).await;

    app.create_post(&ada, &[]).await;
    let posts_path = format!("/api/students/{}/posts", ada.id);

    let denied = app.get(&cem, &posts_path).await;
    assert_eq!(denied.status().as_u16(), 403);
    let body: Value = denied.json().await.unwrap();
    assert_eq!(body["error"], "This profile is private");

    let follow_path = format!("/api/students/{}/follow", ada.id);
    let requested = app.post(&cem, &follow_path, json!({})).await;
    assert_eq!(requested.status().as_u16(), 202);
    let requested: Value = requested.json().await.unwrap();
    assert_eq!(requested["following"], false);
    let request_id = requested["request_id"].as_i64().unwrap();

    // A pending request grants nothing.
    assert_eq!(app.get(&cem, &posts_path).await.status().as_u16(), 403);
    assert_eq!(app.post(&cem, &follow_path, json!({})).await.status().as_u16(), 409);

    let logs: Vec<Value> = app.get(&ada, "/api/logs").await.json().await.unwrap();
    assert_eq!(logs[0]["message"], "cem sent you a request");

    let received: Vec<Value> = app
        .get(&ada, "/api/friend-requests/received")
        .await
        .json()
        .await
        .unwrap();
    assert_eq!(received.len(), 1);
    assert_eq!(received[0]["id"], request_id);
    assert_eq!(received[0]["username"], "cem");
    assert_eq!(received[0]["time_ago"], "0 minutes ago");

    let sent: Vec<Value> = app
        .get(&cem, "/api/friend-requests/sent")
        .await
        .json()
        .await
        .unwrap();
    assert_eq!(sent[0]["username"], "ada");

    let accept_path = format!("/api/friend-requests/{}/accept", request_id);
    assert_eq!(app.post(&bora, &accept_path, json!({})).await.status().as_u16(), 403);
    assert_eq!(app.post(&cem, &accept_path, json!({})).await.status().as_u16(), 403);
    assert_eq!(app.post(&ada, &accept_path, json!({})).await.status().as_u16(), 200);
    assert_eq!(app.post(&ada, &accept_path, json!({})).await.status().as_u16(), 404);

    let allowed = app.get(&cem, &posts_path).await;
    assert_eq!(allowed.status().as_u16(), 200);
    let posts: Vec<Value> = allowed.json().await.unwrap();
    assert_eq!(posts.len(), 1);

    let cem_logs: Vec<Value> = app.get(&cem, "/api/logs").await.json().await.unwrap();
    assert_eq!(cem_logs[0]["message"], "ada accepted your request");
    let ada_logs: Vec<Value> = app.get(&ada, "/api/logs").await.json().await.unwrap();
    assert!(ada_logs.iter().any(|l| l["message"] == "cem started following you"));

    // Still a stranger to bora.
    assert_eq!(app.get(&bora, &posts_path).await.status().as_u16(), 403);
}

#[tokio::test]
async fn friend_requests_can_be_rejected_or_cancelled() {
    let app = spawn_app().await;
    let ada = app.student("ada").await;
    let bora = app.student("bora").await;
    let cem = app.student("cem").await;
    make_private(&app, &ada).await;

    let follow_path = format!("/api/students/{}/follow", ada.id);
    let request: Value = app.post(&bora, &follow_path, json!({})).await.json().await.unwrap();
    let reject_path = format!("/api/friend-requests/{}/reject", request["request_id"]);

    assert_eq!(app.post(&bora, &reject_path, json!({})).await.status().as_u16(), 403);
    assert_eq!(app.post(&ada, &reject_path, json!({})).await.status().as_u16(), 204);
    let logs: Vec<Value> = app.get(&bora, "/api/logs").await.json().await.unwrap();
    assert_eq!(logs[0]["message"], "ada rejected your request");

    // Rejection clears the way for a new request.
    let request: Value = app.post(&bora, &follow_path, json!({})).await.json().await.unwrap();
    let cancel_path = format!("/api/friend-requests/{}", request["request_id"]);

    assert_eq!(app.delete(&ada, &cancel_path).await.status().as_u16(), 403);
    assert_eq!(app.delete(&bora, &cancel_path).await.status().as_u16(), 204);
    assert_eq!(app.delete(&bora, &cancel_path).await.status().as_u16(), 404);

    let received: Vec<Value> = app
        .get(&ada, "/api/friend-requests/received")
        .await
        .json()
        .await
        .unwrap();
    assert!(received.is_empty());

    // Blocking drops whatever is pending between the pair.
    app.post(&cem, &follow_path, json!({})).await;
    let block = app
        .post(&ada, &format!("/api/students/{}/block", cem.id), json!({}))
        .await;
    assert_eq!(block.status().as_u16(), 201);
    let sent: Vec<Value> = app
        .get(&cem, "/api/friend-requests/sent")
        .await
        .json()
        .await
        .unwrap();
    assert!(sent.is_empty());
}

#[tokio::test]
async fn story_lifecycle() {
    let app = spawn_app().await;
    let ada = app.student("ada").await;
    let bora = app.student("bora").await;

    let created = app
        .post(
            &ada,
            "/api/stories",
            json!({ "photo": "https://cdn.campus.test/story.jpg" }),
        )
        .await;
    assert_eq!(created.status().as_u16(), 201);
    let story: Value = created.json().await.unwrap();
    let story_id = story["id"].as_i64().unwrap();

    let too_long = app
        .post(
            &ada,
            &format!("/api/stories/{}/extend", story_id),
            json!({ "hours": 30 }),
        )
        .await;
    assert_eq!(too_long.status().as_u16(), 400);

    let extended: Value = app
        .post(
            &ada,
            &format!("/api/stories/{}/extend", story_id),
            json!({ "hours": 5 }),
        )
        .await
        .json()
        .await
        .unwrap();
    assert_ne!(extended["expires_at"], story["expires_at"]);

    let foreign = app
        .post(&bora, &format!("/api/stories/{}/feature", story_id), json!({}))
        .await;
    assert_eq!(foreign.status().as_u16(), 403);

    let view = app
        .post(&bora, &format!("/api/stories/{}/view", story_id), json!({}))
        .await;
    assert_eq!(view.status().as_u16(), 204);

    let liked: Value = app
        .post(&bora, &format!("/api/stories/{}/like", story_id), json!({}))
        .await
        .json()
        .await
        .unwrap();
    assert_eq!(liked["liked"], true);

    let popular: Vec<Value> = app
        .get(&bora, "/api/stories/popular")
        .await
        .json()
        .await
        .unwrap();
    assert_eq!(popular[0]["id"], story_id);
    assert_eq!(popular[0]["score"], 3);
    assert_eq!(popular[0]["view_count"], 1);

    let feature_path = format!("/api/stories/{}/feature", story_id);
    assert_eq!(app.post(&ada, &feature_path, json!({})).await.status().as_u16(), 200);
    assert_eq!(app.post(&ada, &feature_path, json!({})).await.status().as_u16(), 409);

    let featured_extend = app
        .post(
            &ada,
            &format!("/api/stories/{}/extend", story_id),
            json!({ "hours": 2 }),
        )
        .await;
    assert_eq!(featured_extend.status().as_u16(), 400);

    let highlights: Vec<Value> = app
        .get(&bora, &format!("/api/students/{}/highlights", ada.id))
        .await
        .json()
        .await
        .unwrap();
    assert_eq!(highlights.len(), 1);

    let logs: Vec<Value> = app.get(&ada, "/api/logs").await.json().await.unwrap();
    assert_eq!(logs[0]["message"], "bora liked your story");
}

#[tokio::test]
async fn story_feed_shows_followed_students_only() {
    let app = spawn_app().await;
    let ada = app.student("ada").await;
    let bora = app.student("bora").await;
    let cem = app.student("cem").await;

    for author in [&ada, &cem] {
        app.post(
            author,
            "/api/stories",
            json!({ "photo": "https://cdn.campus.test/story.jpg" }),
        )
        .await;
    }
    app.post(&bora, &format!("/api/students/{}/follow", ada.id), json!({}))
        .await;

    let feed: Vec<Value> = app
        .get(&bora, "/api/stories/feed")
        .await
        .json()
        .await
        .unwrap();
    assert_eq!(feed.len(), 1);
    assert_eq!(feed[0]["username"], "ada");
}

#[tokio::test]
async fn comment_deletion_is_limited_to_author_and_owner() {
    let app = spawn_app().await;
    let ada = app.student("ada").await;
    let bora = app.student("bora").await;
    let cem = app.student("cem").await;

    let post_id = app.create_post(&ada, &[]).await["id"].as_i64().unwrap();
    let comment: Value = app
        .post(
            &cem,
            &format!("/api/posts/{}/comments", post_id),
            json!({ "content": "<b>nice</b>" }),
        )
        .await
        .json()
        .await
        .unwrap();
    assert_eq!(comment["content"], "<b>nice</b>");
    let comment_path = format!("/api/comments/{}", comment["id"]);

    assert_eq!(app.delete(&bora, &comment_path).await.status().as_u16(), 403);
    assert_eq!(app.delete(&ada, &comment_path).await.status().as_u16(), 204);
    assert_eq!(app.post_score(&ada, post_id).await, 0);
}

#[tokio::test]
async fn best_popularity_ranks_by_followers() {
    let app = spawn_app().await;
    let ada = app.student("ada").await;
    let bora = app.student("bora").await;
    let cem = app.student("cem").await;

    for follower in [&bora, &cem] {
        app.post(follower, &format!("/api/students/{}/follow", ada.id), json!({}))
            .await;
    }

    let ranking: Vec<Value> = app
        .get(&ada, "/api/students/best-popularity")
        .await
        .json()
        .await
        .unwrap();

    assert_eq!(ranking.len(), 3);
    assert_eq!(ranking[0]["username"], "ada");
    assert_eq!(ranking[0]["popularity_score"], 10);
}

#[tokio::test]
async fn logs_can_be_dismissed() {
    let app = spawn_app().await;
    let ada = app.student("ada").await;
    let bora = app.student("bora").await;

    app.post(&bora, &format!("/api/students/{}/follow", ada.id), json!({}))
        .await;
    let logs: Vec<Value> = app.get(&ada, "/api/logs").await.json().await.unwrap();
    let log_path = format!("/api/logs/{}", logs[0]["id"]);

    assert_eq!(app.delete(&bora, &log_path).await.status().as_u16(), 404);
    assert_eq!(app.delete(&ada, &log_path).await.status().as_u16(), 204);

    let remaining: Vec<Value> = app.get(&ada, "/api/logs").await.json().await.unwrap();
    assert!(remaining.is_empty());
}
