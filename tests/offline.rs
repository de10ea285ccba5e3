mod support;

use std::io::Write;

use netlayer::{Client, DownloadDestination, MultipartPart, Request};
use support::{FOO_BODY, Foo};
use tempfile::NamedTempFile;

const BASE: &str = "https://mockurlawfgafwafawf.com";

fn fixture(content: &str) -> NamedTempFile {
    let mut file = NamedTempFile::new().unwrap();
    file.write_all(content.as_bytes()).unwrap();
    file
}

#[tokio::test]
async fn fixture_decodes_like_a_live_response() {
    let file = fixture(FOO_BODY);
    let request = Request::get(BASE).path("foo").fixture(file.path()).build();

    let decoded = Client::offline().send_decoded::<Foo>(&request).await.unwrap();

    assert_eq!(decoded.value().foo, "test");
    assert_eq!(decoded.status(), 200);
    assert_eq!(decoded.response().bytes().len(), 30);
}

#[tokio::test]
async fn missing_fixture_is_a_bad_request() {
    let error = Client::offline()
        .send(&Request::get(BASE).build())
        .await
        .unwrap_err();

    assert!(error.is_bad_request());
    assert!(error.to_string().contains("missing test data"));
}

#[tokio::test]
async fn multipart_upload_answers_with_the_fixture() {
    let file = fixture(FOO_BODY);
    let request = Request::post(BASE)
        .multipart(vec![MultipartPart::file(
            "foo",
            bytes::Bytes::new(),
            "foo.png",
            "image/png",
        )])
        .fixture(file.path())
        .build();

    let response = Client::offline().send(&request).await.unwrap();
    assert_eq!(response.bytes().as_ref(), FOO_BODY.as_bytes());
}

#[tokio::test]
async fn download_writes_fixture_to_destination() {
    let file = fixture("downloaded");
    let dir = tempfile::tempdir().unwrap();
    let target = dir.path().join("nested/out.txt");
    let request = Request::get(BASE)
        .download(Some(
            DownloadDestination::new(&target).create_intermediate_directories(),
        ))
        .fixture(file.path())
        .build();

    let response = Client::offline().send(&request).await.unwrap();

    assert_eq!(response.destination(), Some(target.as_path()));
    assert_eq!(std::fs::read_to_string(&target).unwrap(), "downloaded");
}
