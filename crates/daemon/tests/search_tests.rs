//! End-to-end create/modify/delete/exclude/budget scenarios over a real
//! on-disk chunk store, the indexing pipeline and the search service,
//! without a live embedding provider (regex search only).

mod common;

use sourcelens_index::ChangeKind;

use common::TestProject;

#[tokio::test]
async fn create_then_search_finds_the_new_function() {
  let project = TestProject::new().await;
  let path = project.write_file("sample.py", "def greet():\n    return \"hi\"\n");
  project.coordinator.enqueue(path, ChangeKind::Created).await;
  project.coordinator.flush().await;

  let result = project
    .search
    .search_regex("def greet", None, None, None, None, None)
    .await
    .expect("regex search should succeed");

  assert_eq!(result.results.len(), 1);
  let hit = &result.results[0];
  assert_eq!(hit.symbol, "greet");
  assert_eq!(hit.start_line, 1);
  assert_eq!(hit.end_line, 2);
}

#[tokio::test]
async fn modify_adding_a_function_does_not_duplicate_chunks() {
  let project = TestProject::new().await;
  let path = project.write_file("sample.py", "def one():\n    return 1\n");
  project.coordinator.enqueue(path.clone(), ChangeKind::Created).await;
  project.coordinator.flush().await;

  project.write_file("sample.py", "def one():\n    return 1\n\n\ndef two():\n    return 2\n");
  project.coordinator.enqueue(path, ChangeKind::Modified).await;
  project.coordinator.flush().await;

  let result = project
    .search
    .search_regex("def ", None, None, None, None, None)
    .await
    .expect("regex search should succeed");

  assert_eq!(result.results.len(), 2);
}

#[tokio::test]
async fn deleting_a_file_removes_its_chunks_and_updates_stats() {
  let project = TestProject::new().await;
  let path = project.write_file("sample.py", "def greet():\n    return \"hi\"\n");
  project.coordinator.enqueue(path.clone(), ChangeKind::Created).await;
  project.coordinator.flush().await;

  let before = project.store.stats().await.expect("stats should succeed");
  assert_eq!(before.total_files, 1);

  std::fs::remove_file(&path).expect("failed to remove test file");
  project.coordinator.enqueue(path, ChangeKind::Deleted).await;
  project.coordinator.flush().await;

  let result = project
    .search
    .search_regex("def greet", None, None, None, None, None)
    .await
    .expect("regex search should succeed");
  assert!(result.results.is_empty());

  let after = project.store.stats().await.expect("stats should succeed");
  assert_eq!(after.total_files, 0);
}

#[tokio::test]
async fn excluded_paths_never_produce_rows() {
  let project = TestProject::with_excludes(&["**/vendor/**"]).await;
  std::fs::create_dir_all(project.root.path().join("vendor")).expect("failed to create vendor dir");
  let path = project.write_file("vendor/x.py", "def vendored():\n    return 'nope'\n");
  project.coordinator.enqueue(path, ChangeKind::Created).await;
  project.coordinator.flush().await;

  let result = project
    .search
    .search_regex("vendored", None, None, None, None, None)
    .await
    .expect("regex search should succeed");
  assert!(result.results.is_empty());

  let stats = project.store.stats().await.expect("stats should succeed");
  assert_eq!(stats.total_files, 0);
}

#[tokio::test]
async fn response_budget_is_never_exceeded_and_reports_has_more() {
  let project = TestProject::new().await;
  for i in 0..50 {
    let path = project.write_file(
      &format!("module_{i}.py"),
      &format!("def handler_{i}(request):\n    return request.ok()\n"),
    );
    project.coordinator.enqueue(path, ChangeKind::Created).await;
  }
  project.coordinator.flush().await;

  let result = project
    .search
    .search_regex("def handler_", None, None, Some(512), None, None)
    .await
    .expect("regex search should succeed");

  assert!(result.pagination.total.unwrap_or(0) >= 50);
  assert!(
    result.results.len() < result.pagination.total.unwrap() as usize,
    "a 512 byte budget should force the page to stay well short of all 50 matches"
  );
  assert!(result.pagination.has_more);
}
