mod common;

use axum::http::StatusCode;
use common::{PASSWORD, body_string, spawn_app};
use serde_json::{Value, json};

#[tokio::test]
async fn anonymous_admin_request_is_unauthorized() {
    let t = spawn_app().await;
    let resp = t.send_json("GET", "/admin/questions", None, None).await;
    assert_eq!(resp.status(), StatusCode::UNAUTHORIZED);
    assert!(body_string(resp).await.contains(r#""code":"UNAUTHORIZED""#));
}

#[tokio::test]
async fn regular_user_is_forbidden() {
    let t = spawn_app().await;
    t.create_user("bob", false).await;
    let cookie = t.login("bob", PASSWORD).await;

    let resp = t
        .send_json("GET", "/admin/questions", None, Some(&cookie))
        .await;
    assert_eq!(resp.status(), StatusCode::FORBIDDEN);
}

#[tokio::test]
async fn staff_creates_question_with_choices() {
    let t = spawn_app().await;
    t.create_user("staff", true).await;
    let cookie = t.login("staff", PASSWORD).await;

    let resp = t
        .send_json(
            "POST",
            "/admin/questions",
            Some(json!({
                "question_text": "  Best season?  ",
                "pub_date": "2024-01-01T00:00:00Z",
                "choices": ["Summer", "Winter"],
            })),
            Some(&cookie),
        )
        .await;
    assert_eq!(resp.status(), StatusCode::CREATED);

    let detail: Value = serde_json::from_str(&body_string(resp).await).unwrap();
    assert_eq!(detail["question_text"], "Best season?");
    assert_eq!(detail["status"], "Open");
    assert_eq!(detail["was_published_recently"], false);
    let choices = detail["choices"].as_array().unwrap();
    assert_eq!(choices.len(), 2);
    assert_eq!(choices[0]["choice_text"], "Summer");
    assert_eq!(choices[0]["votes"], 0);

    let index = body_string(t.get("/polls/", None).await).await;
    assert!(index.contains("Best season?"));
}

#[tokio::test]
async fn end_date_before_pub_date_is_rejected() {
    let t = spawn_app().await;
    t.create_user("staff", true).await;
    let cookie = t.login("staff", PASSWORD).await;

    let resp = t
        .send_json(
            "POST",
            "/admin/questions",
            Some(json!({
                "question_text": "Backwards",
                "pub_date": "2024-02-01T00:00:00Z",
                "end_date": "2024-01-01T00:00:00Z",
            })),
            Some(&cookie),
        )
        .await;
    assert_eq!(resp.status(), StatusCode::BAD_REQUEST);
    assert!(t.storage.list_questions().await.unwrap().is_empty());
}

#[tokio::test]
async fn update_keeps_pub_date_when_omitted() {
    let t = spawn_app().await;
    t.create_user("staff", true).await;
    let cookie = t.login("staff", PASSWORD).await;
    let id = t.create_question("Old text", -3, None, &["a"]).await;
    let before = t.storage.get_question(id).await.unwrap().unwrap();

    let resp = t
        .send_json(
            "PUT",
            &format!("/admin/questions/{id}"),
            Some(json!({ "question_text": "New text" })),
            Some(&cookie),
        )
        .await;
    assert_eq!(resp.status(), StatusCode::OK);

    let after = t.storage.get_question(id).await.unwrap().unwrap();
    assert_eq!(after.question_text, "New text");
    assert_eq!(after.pub_date, before.pub_date);
}

#[tokio::test]
async fn deleting_question_removes_it_and_its_choices() {
    let t = spawn_app().await;
    t.create_user("staff", true).await;
    let cookie = t.login("staff", PASSWORD).await;
    let id = t.create_question("Doomed", -1, None, &["a", "b"]).await;

    let resp = t
        .send_json("DELETE", &format!("/admin/questions/{id}"), None, Some(&cookie))
        .await;
    assert_eq!(resp.status(), StatusCode::NO_CONTENT);
    assert!(t.storage.choices_for(id).await.unwrap().is_empty());

    let resp = t
        .send_json("GET", &format!("/admin/questions/{id}"), None, Some(&cookie))
        .await;
    assert_eq!(resp.status(), StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn staff_adds_and_renames_choices() {
    let t = spawn_app().await;
    t.create_user("staff", true).await;
    let cookie = t.login("staff", PASSWORD).await;
    let id = t.create_question("Colour?", -1, None, &["Red"]).await;

    let resp = t
        .send_json(
            "POST",
            &format!("/admin/questions/{id}/choices"),
            Some(json!({ "choice_text": "Blue" })),
            Some(&cookie),
        )
        .await;
    assert_eq!(resp.status(), StatusCode::CREATED);

    let blue = t.storage.choices_for(id).await.unwrap()[1].id;
    let resp = t
        .send_json(
            "PUT",
            &format!("/admin/choices/{blue}"),
            Some(json!({ "choice_text": "Navy" })),
            Some(&cookie),
        )
        .await;
    assert_eq!(resp.status(), StatusCode::OK);

    let texts: Vec<String> = t
        .storage
        .choices_for(id)
        .await
        .unwrap()
        .into_iter()
        .map(|c| c.choice_text)
        .collect();
    assert_eq!(texts, vec!["Red", "Navy"]);
}

#[tokio::test]
async fn user_list_never_exposes_password_hashes() {
    let t = spawn_app().await;
    t.create_user("staff", true).await;
    let cookie = t.login("staff", PASSWORD).await;

    let resp = t.send_json("GET", "/admin/users", None, Some(&cookie)).await;
    assert_eq!(resp.status(), StatusCode::OK);
    let body = body_string(resp).await;
    assert!(body.contains(r#""username":"staff""#));
    assert!(!body.contains("argon2"));
}

#[tokio::test]
async fn invalid_json_bodies_get_the_api_error_shape() {
    let t = spawn_app().await;
    t.create_user("staff", true).await;
    let cookie = t.login("staff", PASSWORD).await;

    let resp = t
        .send_json(
            "POST",
            "/admin/questions",
            Some(json!({ "pub_date": "2024-01-01T00:00:00Z" })),
            Some(&cookie),
        )
        .await;
    assert_eq!(resp.status(), StatusCode::BAD_REQUEST);
    let body: Value = serde_json::from_str(&body_string(resp).await).unwrap();
    assert_eq!(body["error"]["code"], "BAD_REQUEST");
    assert!(body["error"]["message"].as_str().unwrap().contains("question_text"));

    // No body and no content type at all.
    let resp = t
        .send_json("POST", "/admin/questions", None, Some(&cookie))
        .await;
    assert_eq!(resp.status(), StatusCode::BAD_REQUEST);
    assert!(body_string(resp).await.contains(r#""code":"BAD_REQUEST""#));
}

#[tokio::test]
async fn deleting_a_choice_removes_its_votes() {
    let t = spawn_app().await;
    t.create_user("staff", true).await;
    let cookie = t.login("staff", PASSWORD).await;
    let voter = t.create_user("voter", false).await;
    let id = t.create_question("Pet?", -1, None, &["Cat", "Dog"]).await;
    let cat = t.storage.choices_for(id).await.unwrap()[0].clone();
    t.storage.record_vote(voter, &cat).await.unwrap();
    assert!(t.storage.vote_of(voter, id).await.unwrap().is_some());

    let resp = t
        .send_json("DELETE", &format!("/admin/choices/{}", cat.id), None, Some(&cookie))
        .await;
    assert_eq!(resp.status(), StatusCode::NO_CONTENT);

    assert!(t.storage.vote_of(voter, id).await.unwrap().is_none());
    let tallies = t.storage.results(id).await.unwrap();
    assert_eq!(tallies.len(), 1);
    assert_eq!(tallies[0].votes, 0);
}
