//! OVER/HDR semantics, metagroup views, and GZIP-framed multi-line payloads

mod common;

use common::{TestServer, make_admin, seed_article};

use flate2::read::GzDecoder;
use nntp_archive::storage::Storage;
use std::io::Read;

async fn authenticate(client: &mut common::TestClient, user: &str, pass: &str) {
    client.roundtrip(&format!("AUTHINFO USER {user}")).await;
    assert_eq!(
        client.roundtrip(&format!("AUTHINFO PASS {pass}")).await,
        "281 Authentication accepted"
    );
}

// === OVER ===

#[tokio::test]
async fn test_over_range_scan() {
    let server = TestServer::new(vec![]).await;
    for i in 1..=3 {
        seed_article(&server.store, &format!("<o{i}@x>"), "local.test", "12345\r\n").await;
    }
    let mut client = server.connect_ready().await;
    assert_eq!(client.roundtrip("GROUP local.test").await, "211 3 1 3 local.test");

    client.send("OVER 1-3").await;
    assert_eq!(
        client.read_line().await,
        "224 Overview information follows (multi-line)"
    );
    let rows = client.read_multiline().await;
    assert_eq!(rows.len(), 3);
    for (i, row) in rows.iter().enumerate() {
        let fields: Vec<&str> = row.split('\t').collect();
        assert_eq!(fields.len(), 8, "eight tab-separated overview fields");
        assert_eq!(fields[0], (i + 1).to_string(), "ordered by number ascending");
        assert_eq!(fields[1], "seeded");
        assert_eq!(fields[4], format!("<o{}@x>", i + 1));
        // :bytes is body length times two ("12345\r\n" is 7 octets)
        assert_eq!(fields[6], "14");
        assert_eq!(fields[7], "1");
    }
}

#[tokio::test]
async fn test_over_open_range_and_current_article() {
    let server = TestServer::new(vec![]).await;
    for i in 1..=4 {
        seed_article(&server.store, &format!("<o{i}@x>"), "local.test", "b\r\n").await;
    }
    let mut client = server.connect_ready().await;
    client.roundtrip("GROUP local.test").await;

    client.send("OVER 3-").await;
    client.read_line().await;
    assert_eq!(client.read_multiline().await.len(), 2);

    // No argument: the current article (pointer is at the low watermark)
    client.send("OVER").await;
    client.read_line().await;
    let rows = client.read_multiline().await;
    assert_eq!(rows.len(), 1);
    assert!(rows[0].starts_with("1\t"));
}

#[tokio::test]
async fn test_over_errors() {
    let server = TestServer::new(vec![]).await;
    seed_article(&server.store, "<o@x>", "local.test", "b\r\n").await;
    let mut client = server.connect_ready().await;

    assert_eq!(client.roundtrip("OVER 1-2").await, "412 No newsgroup selected");

    client.roundtrip("GROUP local.test").await;
    assert_eq!(
        client.roundtrip("OVER 5-9").await,
        "423 No article with that number"
    );
    // Inverted range is empty
    assert_eq!(
        client.roundtrip("OVER 3-1").await,
        "423 No article with that number"
    );
    assert_eq!(client.roundtrip("OVER 1-2-3").await, "501 Syntax error");
}

#[tokio::test]
async fn test_over_by_message_id_uses_number_zero() {
    let server = TestServer::new(vec![]).await;
    seed_article(&server.store, "<m@x>", "local.test", "b\r\n").await;
    let mut client = server.connect_ready().await;

    client.send("OVER <m@x>").await;
    client.read_line().await;
    let rows = client.read_multiline().await;
    assert_eq!(rows.len(), 1);
    assert!(rows[0].starts_with("0\t"), "message-id selection reports number 0");
}

#[tokio::test]
async fn test_xover_is_an_alias() {
    let server = TestServer::new(vec![]).await;
    seed_article(&server.store, "<x@x>", "local.test", "b\r\n").await;
    let mut client = server.connect_ready().await;
    client.roundtrip("GROUP local.test").await;

    client.send("XOVER 1").await;
    assert_eq!(
        client.read_line().await,
        "224 Overview information follows (multi-line)"
    );
    assert_eq!(client.read_multiline().await.len(), 1);
}

#[tokio::test]
async fn test_over_unfolds_header_values() {
    let server = TestServer::new(vec![]).await;
    let mut article = common::make_article("<fold@x>", "local.test", "unused", "b\r\n");
    // A subject that was folded across lines arrives with embedded tabs
    article.set_header("Subject", "part one\tpart\ttwo");
    server
        .store
        .insert_article(
            article,
            vec![nntp_archive::storage::PendingLink {
                group: "local.test".to_string(),
                pending: false,
            }],
        )
        .await
        .unwrap();

    let mut client = server.connect_ready().await;
    client.roundtrip("GROUP local.test").await;
    client.send("OVER 1").await;
    client.read_line().await;
    let rows = client.read_multiline().await;
    let fields: Vec<&str> = rows[0].split('\t').collect();
    assert_eq!(fields[1], "part one part two", "tabs unfold to single spaces");
}

// === HDR / XHDR ===

#[tokio::test]
async fn test_hdr_range() {
    let server = TestServer::new(vec![]).await;
    for i in 1..=2 {
        seed_article(&server.store, &format!("<h{i}@x>"), "local.test", "b\r\n").await;
    }
    let mut client = server.connect_ready().await;
    client.roundtrip("GROUP local.test").await;

    client.send("HDR Subject 1-2").await;
    assert_eq!(client.read_line().await, "225 Headers follow (multi-line)");
    assert_eq!(client.read_multiline().await, ["1 seeded", "2 seeded"]);

    client.send("XHDR Subject 1").await;
    assert_eq!(client.read_line().await, "221 Header follows (multi-line)");
    assert_eq!(client.read_multiline().await, ["1 seeded"]);
}

#[tokio::test]
async fn test_hdr_by_message_id_and_missing_header() {
    let server = TestServer::new(vec![]).await;
    seed_article(&server.store, "<h@x>", "local.test", "b\r\n").await;
    let mut client = server.connect_ready().await;

    client.send("HDR Message-ID <h@x>").await;
    client.read_line().await;
    assert_eq!(client.read_multiline().await, ["0 <h@x>"]);

    client.send("HDR Organization <h@x>").await;
    client.read_line().await;
    assert_eq!(client.read_multiline().await, ["0 "], "absent header yields empty value");

    assert_eq!(
        client.roundtrip("HDR Subject <none@x>").await,
        "430 No article with that message-id"
    );
}

// === Metagroup views ===

#[tokio::test]
async fn test_metagroups_hidden_from_ordinary_readers() {
    let server = TestServer::new(vec![]).await;
    seed_article(&server.store, "<m@x>", "local.test", "b\r\n").await;
    let mut client = server.connect_ready().await;

    assert_eq!(
        client.roundtrip("GROUP local.test.deleted").await,
        "411 No such newsgroup"
    );
    assert_eq!(
        client.roundtrip("GROUP local.test.pending").await,
        "411 No such newsgroup"
    );

    // Not listed either
    client.send("LIST").await;
    client.read_line().await;
    let lines = client.read_multiline().await;
    assert!(lines.iter().all(|l| !l.contains(".deleted") && !l.contains(".pending")));
}

#[tokio::test]
async fn test_deleted_metagroup_for_privileged_reader() {
    let server = TestServer::new(vec![make_admin("op", "pw", |a| {
        a.can_cancel = true;
    })])
    .await;
    let number = seed_article(&server.store, "<del@x>", "local.test", "b\r\n").await;
    let links = server.store.links_for_message_id("<del@x>").await.unwrap();
    let mut cancelled = links[0].clone();
    cancelled.cancelled = true;
    server.store.update_link(&cancelled).await.unwrap();

    let mut client = server.connect_ready().await;
    authenticate(&mut client, "op", "pw").await;

    assert_eq!(
        client.roundtrip("GROUP local.test.deleted").await,
        format!("211 1 {number} {number} local.test.deleted")
    );
    assert_eq!(
        client.roundtrip(&format!("STAT {number}")).await,
        format!("223 {number} <del@x> Article exists")
    );

    // The ordinary view no longer shows it
    assert_eq!(
        client.roundtrip("GROUP local.test").await,
        "211 0 0 0 local.test"
    );
}

#[tokio::test]
async fn test_pending_metagroup_for_moderator() {
    let server = TestServer::new(vec![make_admin("mod", "pw", |a| {
        a.moderates = vec!["local.mod".to_string()];
    })])
    .await;
    let mut group = nntp_archive::models::Newsgroup::new("local.mod", "", "admin");
    group.moderated = true;
    server.store.add_newsgroup(group);

    // Anonymous post into the moderated group is held pending
    let mut poster = server.connect_ready().await;
    poster.roundtrip("POST").await;
    poster
        .send_raw(
            b"Date: Mon, 01 Jan 2024 00:00:00 +0000\r\nFrom: p@e\r\nSubject: held\r\n\
              Newsgroups: local.mod\r\nMessage-ID: <held@x>\r\nPath: h\r\n\r\nb\r\n.\r\n",
        )
        .await;
    assert_eq!(poster.read_line().await, "240 Article received OK");

    let mut client = server.connect_ready().await;
    authenticate(&mut client, "mod", "pw").await;
    assert_eq!(
        client.roundtrip("GROUP local.mod.pending").await,
        "211 1 1 1 local.mod.pending"
    );
    assert_eq!(client.roundtrip("STAT 1").await, "223 1 <held@x> Article exists");
}

// === GZIP framing ===

#[tokio::test]
async fn test_xfeature_gzip_framed_over() {
    let server = TestServer::new(vec![]).await;
    seed_article(&server.store, "<z@x>", "local.test", "body\r\n").await;
    let mut client = server.connect_ready().await;
    client.roundtrip("GROUP local.test").await;

    assert_eq!(
        client.roundtrip("XFEATURE COMPRESS GZIP TERMINATOR").await,
        "290 feature enabled"
    );

    // The status line stays plain; the payload (terminator included) is one
    // GZIP stream
    client.send("OVER 1").await;
    assert_eq!(
        client.read_line().await,
        "224 Overview information follows (multi-line)"
    );

    client.send("QUIT").await;
    let tail = client.read_to_end().await;
    let closing = b"205 Connection closing\r\n";
    assert!(tail.ends_with(closing), "closing line after the frame");
    let frame = &tail[..tail.len() - closing.len()];

    let mut decoder = GzDecoder::new(frame);
    let mut plain = Vec::new();
    decoder.read_to_end(&mut plain).unwrap();
    let text = String::from_utf8(plain).unwrap();
    assert!(text.starts_with("1\tseeded\t"), "decompressed overview row: {text}");
    assert!(
        text.ends_with("\r\n.\r\n"),
        "decompressed frame includes the terminator"
    );
}
