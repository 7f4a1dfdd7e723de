mod common;

use anyhow::Result;
use common::{GymFixtures, parse_date, test_service};
use palestra::application::{AppError, ErrorKind};
use palestra::domain::MembershipState;
use palestra::io::Exporter;

#[tokio::test]
async fn test_register_and_resolve_users() -> Result<()> {
    let (service, _temp) = test_service().await?;

    let user = service.register_user("Ana@Gym.test", "Ana").await?;
    assert_eq!(user.email, "ana@gym.test");

    let by_email = service.resolve_user("ANA@gym.test").await?;
    assert_eq!(by_email.id, user.id);
    let by_id = service.resolve_user(&user.id.to_string()).await?;
    assert_eq!(by_id.email, user.email);

    let err = service.register_user("ana@gym.test", "Other").await.unwrap_err();
    assert!(matches!(err, AppError::UserAlreadyExists(_)));
    assert_eq!(err.kind(), ErrorKind::Conflict);

    let err = service.resolve_user("nobody@gym.test").await.unwrap_err();
    assert_eq!(err.kind(), ErrorKind::UserNotFound);

    assert_eq!(service.list_users().await?.len(), 1);

    Ok(())
}

#[tokio::test]
async fn test_one_membership_per_user() -> Result<()> {
    let (service, _temp) = test_service().await?;
    let (user, membership) = GymFixtures::member(&service, "ana@gym.test", 4).await?;

    assert_eq!(membership.state, MembershipState::Active);
    assert_eq!(service.get_membership(user.id).await?.id, membership.id);

    let err = service
        .create_membership(
            user.id,
            8,
            parse_date("2024-04-01"),
            parse_date("2024-06-01"),
            MembershipState::Active,
        )
        .await
        .unwrap_err();
    assert!(matches!(err, AppError::MembershipAlreadyExists(id) if id == user.id));

    // Still the original one
    assert_eq!(service.get_membership(user.id).await?.credits, 4);

    Ok(())
}

#[tokio::test]
async fn test_membership_requires_user_and_sane_dates() -> Result<()> {
    let (service, _temp) = test_service().await?;

    let err = service
        .create_membership(
            uuid::Uuid::new_v4(),
            4,
            parse_date("2024-04-01"),
            parse_date("2024-05-01"),
            MembershipState::Active,
        )
        .await
        .unwrap_err();
    assert_eq!(err.kind(), ErrorKind::UserNotFound);

    let user = service.register_user("ana@gym.test", "Ana").await?;
    let err = service
        .create_membership(
            user.id,
            4,
            parse_date("2024-05-01"),
            parse_date("2024-04-01"),
            MembershipState::Active,
        )
        .await
        .unwrap_err();
    assert!(matches!(err, AppError::InvalidDateRange(_)));

    let err = service.get_membership(user.id).await.unwrap_err();
    assert_eq!(err.kind(), ErrorKind::MembershipNotFound);

    Ok(())
}

#[tokio::test]
async fn test_cancel_and_delete_membership() -> Result<()> {
    let (service, _temp) = test_service().await?;
    let (user, _) = GymFixtures::member(&service, "ana@gym.test", 4).await?;

    let cancelled = service.cancel_membership(user.id).await?;
    assert_eq!(cancelled.state, MembershipState::Cancelled);
    assert_eq!(cancelled.credits, 4);

    service.delete_membership(user.id).await?;
    let err = service.check_in(user.id).await.unwrap_err();
    assert_eq!(err.kind(), ErrorKind::MembershipNotFound);

    // A fresh membership can be created once the old one is gone
    service
        .create_membership(
            user.id,
            2,
            parse_date("2024-04-01"),
            parse_date("2024-05-01"),
            MembershipState::Active,
        )
        .await?;
    assert_eq!(service.check_in(user.id).await?.credits, 1);

    Ok(())
}

#[tokio::test]
async fn test_created_cancelled_membership_cannot_attend() -> Result<()> {
    let (service, _temp) = test_service().await?;
    let (user, _) =
        GymFixtures::member_with(&service, "ana@gym.test", 4, MembershipState::Cancelled, 30)
            .await?;

    let err = service.check_in(user.id).await.unwrap_err();
    assert_eq!(err.kind(), ErrorKind::MembershipInvalid);

    Ok(())
}

#[tokio::test]
async fn test_export_invoices_and_snapshot() -> Result<()> {
    let (service, _temp) = test_service().await?;
    let (ana, _) = GymFixtures::member(&service, "ana@gym.test", 4).await?;
    let receipt = service.check_in(ana.id).await?;
    service.check_out(ana.id).await?;

    let exporter = Exporter::new(&service);

    let mut invoices_csv = Vec::new();
    let count = exporter.export_invoices_csv(&mut invoices_csv).await?;
    assert_eq!(count, 1);
    let text = String::from_utf8(invoices_csv)?;
    let mut rows = text.lines();
    assert_eq!(rows.next(), Some("id,user,month,status,description,amount"));
    let row = rows.next().unwrap();
    assert!(row.starts_with(&receipt.invoice_id.to_string()));
    assert!(row.contains("ana@gym.test,2024-04,outstanding,Invoice for month number 4,2"));

    let mut lines_csv = Vec::new();
    let count = exporter
        .export_lines_csv(&mut lines_csv, Some(receipt.invoice_id))
        .await?;
    assert_eq!(count, 2);

    let mut json = Vec::new();
    let snapshot = exporter.export_full_json(&mut json).await?;
    assert_eq!(snapshot.users.len(), 1);
    assert_eq!(snapshot.memberships.len(), 1);
    assert_eq!(snapshot.invoice_lines.len(), 2);

    let value: serde_json::Value = serde_json::from_slice(&json)?;
    assert_eq!(value["invoices"][0]["month"], "2024-04");
    assert_eq!(value["invoices"][0]["status"], "outstanding");
    assert_eq!(value["memberships"][0]["credits"], 4);

    Ok(())
}

#[tokio::test]
async fn test_find_membership_separates_missing_from_failure() -> Result<()> {
    let (service, temp) = test_service().await?;
    let (ana, membership) = GymFixtures::member(&service, "ana@gym.test", 4).await?;
    let bob = service.register_user("bob@gym.test", "Bob").await?;

    let found = service.find_membership(ana.id).await?;
    assert_eq!(found.map(|m| m.id), Some(membership.id));
    assert!(service.find_membership(bob.id).await?.is_none());

    // A database without the schema must not look like "no membership"
    let empty = temp.path().join("empty.db");
    std::fs::File::create(&empty)?;
    let broken = palestra::application::AttendanceService::connect(empty.to_str().unwrap()).await?;
    let err = broken.find_membership(ana.id).await.unwrap_err();
    assert_eq!(err.kind(), ErrorKind::Storage);

    Ok(())
}
