mod common;

use std::sync::Arc;

use common::{key, session, FakePortal};
use parcerias::runner::open_member_actions;
use parcerias::{LocatorTable, ReleaseMode, RobotError, Selector, Step};

const MEMBERS_URL: &str = "https://portal.example/voluntarias/membros.do";

fn roles(names: &[&str]) -> Vec<String> {
    names.iter().map(|r| r.to_string()).collect()
}

/// The first row holding any of `roles`, as the navigator addresses it.
fn first_row(table: &str, roles: &[&str]) -> String {
    let titles = roles
        .iter()
        .map(|r| format!("@title=\"{r}\""))
        .collect::<Vec<_>>()
        .join(" or ");
    format!("({table}//tr[.//td[{titles}]])[1]")
}

fn holding(row: &str, role: &str) -> String {
    format!("{row}[.//td[@title=\"{role}\"]]")
}

fn action_button(row: &str) -> String {
    format!("{row}//button[contains(@id, \"tblMembros_acoes\")]")
}

#[tokio::test]
async fn topmost_matching_row_is_opened_whatever_the_role_order() {
    let table = LocatorTable::defaults();
    let members = key(&table, Step::MembersTable);
    let wanted = ["Presidente", "Prefeito"];
    let row = first_row(&members, &wanted);

    // The Prefeito row sits above the Presidente row, so it is the first match.
    let portal = Arc::new(
        FakePortal::new(&table)
            .with_static(members.clone(), "")
            .with_static(row.clone(), "")
            .with_static(holding(&row, "Prefeito"), "")
            .with_static(action_button(&row), ""),
    );

    let found = open_member_actions(
        session(&portal),
        &table,
        MEMBERS_URL,
        &roles(&wanted),
        ReleaseMode::Detach,
    )
    .await
    .unwrap();

    assert_eq!(found.as_deref(), Some("Prefeito"));
    assert_eq!(portal.navigations(), [MEMBERS_URL]);
    assert_eq!(portal.clicks(), [action_button(&row)]);
    assert_eq!(portal.released(), Some(ReleaseMode::Detach));
}

#[tokio::test]
async fn nobody_holding_the_roles_is_not_an_error() {
    let table = LocatorTable::defaults();
    let members = key(&table, Step::MembersTable);
    let portal = Arc::new(FakePortal::new(&table).with_static(members, ""));

    let found = open_member_actions(
        session(&portal),
        &table,
        MEMBERS_URL,
        &roles(&["Presidente", "Prefeito"]),
        ReleaseMode::QuitBrowser,
    )
    .await
    .unwrap();

    assert_eq!(found, None);
    assert!(portal.clicks().is_empty());
    assert_eq!(portal.released(), Some(ReleaseMode::QuitBrowser));
}

#[tokio::test]
async fn members_table_must_be_an_xpath() {
    let table = LocatorTable::defaults()
        .with_overrides([(Step::MembersTable, Selector::from("id:tblMembros"))]);
    let portal = Arc::new(FakePortal::new(&table).with_static("id:tblMembros", ""));

    let err = open_member_actions(
        session(&portal),
        &table,
        MEMBERS_URL,
        &roles(&["Presidente"]),
        ReleaseMode::Detach,
    )
    .await
    .unwrap_err();

    assert!(matches!(err, RobotError::InvalidSelector(_)), "{err:?}");
    assert!(portal.clicks().is_empty());
    assert_eq!(portal.released(), Some(ReleaseMode::Detach));
}

#[tokio::test]
async fn missing_members_table_times_out_and_still_releases() {
    let table = LocatorTable::defaults();
    let portal = Arc::new(FakePortal::new(&table));

    let err = open_member_actions(
        session(&portal),
        &table,
        MEMBERS_URL,
        &roles(&["Presidente"]),
        ReleaseMode::Detach,
    )
    .await
    .unwrap_err();

    assert!(err.is_timeout(), "{err:?}");
    assert_eq!(portal.released(), Some(ReleaseMode::Detach));
}
