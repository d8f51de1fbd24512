use tracing::{debug, info, instrument};

use crate::locators::{LocatorTable, Step};
use crate::selector::xpath_literal;
use crate::{Locator, RobotError, Selector, Session};

/// Drives the portal's menus and forms for one instrument at a time
pub struct Navigator<'a> {
    session: &'a Session,
    locators: &'a LocatorTable,
}

impl<'a> Navigator<'a> {
    pub fn new(session: &'a Session, locators: &'a LocatorTable) -> Self {
        Self { session, locators }
    }

    fn locator(&self, step: Step) -> Result<Locator, RobotError> {
        Ok(self.session.locator(self.locators.get(step)?.clone()))
    }

    /// Wait for `step` to be clickable, then click it.
    pub async fn click(&self, step: Step) -> Result<(), RobotError> {
        debug!(?step, "Clicking");
        self.locator(step)?.click(None).await
    }

    /// Search for `instrument_number` and open its detail page.
    #[instrument(skip(self))]
    pub async fn goto_detail(&self, instrument_number: &str) -> Result<(), RobotError> {
        self.click(Step::MainMenu).await?;
        self.click(Step::SearchSubmenu).await?;
        self.locator(Step::SearchField)?
            .fill(instrument_number, None)
            .await?;
        self.click(Step::SearchSubmit).await?;
        // The result list re-renders after submit; the detail link becoming
        // clickable is the signal that it is done.
        self.click(Step::DetailLink).await?;
        debug!("Detail page open");
        Ok(())
    }

    /// Back to the landing page, ready for the next search.
    #[instrument(skip(self))]
    pub async fn return_home(&self) -> Result<(), RobotError> {
        self.click(Step::HomeLink).await?;
        self.locator(Step::MainMenu)?.wait_clickable(None).await?;
        Ok(())
    }

    /// From the detail page, open the work-plan adjustments list.
    pub async fn open_adjustments(&self) -> Result<(), RobotError> {
        self.click(Step::AdjustmentsMenu).await?;
        self.click(Step::AdjustmentsSubmenu).await
    }

    /// From the detail page, list the instrument's attachments.
    pub async fn open_attachments(&self) -> Result<(), RobotError> {
        self.click(Step::AttachmentsMenu).await?;
        self.click(Step::AttachmentsSubmenu).await?;
        self.click(Step::AttachmentsListButton).await
    }

    #[instrument(skip(self))]
    pub async fn open_url(&self, url: &str) -> Result<(), RobotError> {
        self.session.navigate(url).await
    }

    /// In the members table, press the action button of the first row (top
    /// to bottom) whose role cell carries any of `roles` as its title.
    ///
    /// Returns the role held by that row, or `None` when no member holds any.
    #[instrument(skip(self))]
    pub async fn click_member_action(&self, roles: &[String]) -> Result<Option<String>, RobotError> {
        let table = self.locators.get(Step::MembersTable)?;
        let Selector::XPath(table_path) = table else {
            return Err(RobotError::InvalidSelector(format!(
                "members table must be an XPath to address its rows, got {table}"
            )));
        };
        if roles.is_empty() {
            return Ok(None);
        }
        self.session.locator(table.clone()).wait_present(None).await?;

        let row = first_member_row(table_path, roles);
        if self.session.locator(Selector::XPath(row.clone())).probe().await?.is_none() {
            debug!(?roles, "No member with these roles");
            return Ok(None);
        }

        let mut held = None;
        for role in roles {
            if self.session.locator(row_with_role(&row, role)).probe().await?.is_some() {
                held = Some(role.clone());
                break;
            }
        }
        let Some(role) = held else {
            // The table changed between the two lookups.
            return Err(RobotError::ElementNotFound(row));
        };

        info!(%role, "Member found, opening actions");
        self.session.locator(member_action_button(&row)).click(None).await?;
        Ok(Some(role))
    }
}

/// First row of the table, in document order, whose role cell title is one of `roles`.
fn first_member_row(table_path: &str, roles: &[String]) -> String {
    let titles = roles
        .iter()
        .map(|role| format!("@title={}", xpath_literal(role)))
        .collect::<Vec<_>>()
        .join(" or ");
    format!("({table_path}//tr[.//td[{titles}]])[1]")
}

fn row_with_role(row: &str, role: &str) -> Selector {
    Selector::XPath(format!("{row}[.//td[@title={}]]", xpath_literal(role)))
}

fn member_action_button(row: &str) -> Selector {
    Selector::XPath(format!(
        "{row}//button[contains(@id, \"tblMembros_acoes\")]"
    ))
}
