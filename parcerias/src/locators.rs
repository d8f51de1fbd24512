//! Where each logical UI target lives on the portal.
//!
//! The portal has no API and no stable test ids, so the robot addresses
//! elements by structural paths. Those paths are data: they are kept in a
//! [`LocatorTable`] keyed by [`Step`], can be overridden from the config file,
//! and the navigation code only ever refers to steps.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::{RobotError, Selector};

/// A logical UI target the robot interacts with or reads from
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Step {
    HomeLink,
    MainMenu,
    SearchSubmenu,
    SearchField,
    SearchSubmit,
    DetailLink,
    AdjustmentsMenu,
    AdjustmentsSubmenu,
    AdjustmentInAnalysis,
    AdjustmentDetailLink,
    RequestDate,
    TerminationDate,
    Modality,
    AttachmentsMenu,
    AttachmentsSubmenu,
    AttachmentsListButton,
    AttachmentRows,
    AttachmentDates,
    MembersTable,
}

impl Step {
    pub const ALL: [Step; 19] = [
        Step::HomeLink,
        Step::MainMenu,
        Step::SearchSubmenu,
        Step::SearchField,
        Step::SearchSubmit,
        Step::DetailLink,
        Step::AdjustmentsMenu,
        Step::AdjustmentsSubmenu,
        Step::AdjustmentInAnalysis,
        Step::AdjustmentDetailLink,
        Step::RequestDate,
        Step::TerminationDate,
        Step::Modality,
        Step::AttachmentsMenu,
        Step::AttachmentsSubmenu,
        Step::AttachmentsListButton,
        Step::AttachmentRows,
        Step::AttachmentDates,
        Step::MembersTable,
    ];

    fn default_path(self) -> &'static str {
        match self {
            Step::HomeLink => r#"//*[@id="logo"]/a"#,
            Step::MainMenu => r#"//*[@id="menuPrincipal"]/div[1]/div[4]"#,
            Step::SearchSubmenu => r#"//*[@id="contentMenu"]/div[1]/ul/li[6]/a"#,
            Step::SearchField => r#"//*[@id="consultarNumeroConvenio"]"#,
            Step::SearchSubmit => r#"//*[@id="form_submit"]"#,
            Step::DetailLink => r#"//*[@id="instrumentoId"]/a"#,
            Step::AdjustmentsMenu => r#"//*[@id="div_-173460853"]/span/span"#,
            Step::AdjustmentsSubmenu => {
                r#"//*[@id="menu_link_-173460853_-1293190284"]/div/span/span"#
            }
            Step::AdjustmentInAnalysis => r#"//*[@id="row"]//td[contains(text(),"Em Análise")]"#,
            Step::AdjustmentDetailLink => r#"//*[@id="tbodyrow"]/tr[5]/td[4]/nobr/a"#,
            Step::RequestDate => r#"//*[@id="tr-editarDataSolicitacao"]/td[2]"#,
            Step::TerminationDate => r#"//*[@id="tr-alterarTerminoVigencia"]/td[2]"#,
            Step::Modality => r#"//*[@id="tr-alterarModalidade"]/td[2]/table/tbody/tr/td[1]"#,
            Step::AttachmentsMenu => r#"//*[@id="div_997366806"]/span/span"#,
            Step::AttachmentsSubmenu => r#"//*[@id="menu_link_997366806_1965609892"]/div/span/span"#,
            Step::AttachmentsListButton => {
                "/html/body/div[3]/div[15]/div[3]/div[1]/div/form/table/tbody/tr/td[2]/input[2]"
            }
            Step::AttachmentRows => r#"//*[@id="tbodyrow"]/tr"#,
            Step::AttachmentDates => r#"//*[@id="tbodyrow"]/tr/td[3]/div"#,
            Step::MembersTable => r#"//*[@id="tblMembros"]"#,
        }
    }
}

/// Selector for every [`Step`]
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct LocatorTable {
    entries: BTreeMap<Step, Selector>,
}

impl Default for LocatorTable {
    fn default() -> Self {
        Self::defaults()
    }
}

impl LocatorTable {
    /// The paths of the portal as it was last mapped.
    pub fn defaults() -> Self {
        let entries = Step::ALL
            .iter()
            .map(|&step| (step, Selector::from(step.default_path())))
            .collect();
        Self { entries }
    }

    pub fn empty() -> Self {
        Self {
            entries: BTreeMap::new(),
        }
    }

    pub fn get(&self, step: Step) -> Result<&Selector, RobotError> {
        self.entries
            .get(&step)
            .ok_or_else(|| RobotError::Config(format!("No locator configured for step {step:?}")))
    }

    /// Later entries win.
    pub fn merge<I>(&mut self, overrides: I)
    where
        I: IntoIterator<Item = (Step, Selector)>,
    {
        self.entries.extend(overrides);
    }

    pub fn with_overrides<I>(mut self, overrides: I) -> Self
    where
        I: IntoIterator<Item = (Step, Selector)>,
    {
        self.merge(overrides);
        self
    }

    pub fn to_yaml(&self) -> Result<String, RobotError> {
        serde_yaml::to_string(self)
            .map_err(|e| RobotError::Config(format!("Could not render locator table: {e}")))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn every_step_has_a_valid_default() {
        let table = LocatorTable::defaults();
        for step in Step::ALL {
            let sel = table.get(step).unwrap();
            assert!(sel.is_valid(), "{step:?} -> {sel:?}");
        }
    }

    #[test]
    fn overrides_replace_defaults() {
        let table = LocatorTable::defaults().with_overrides([(
            Step::SearchSubmenu,
            Selector::from(r#"//*[@id="contentMenu"]/div[1]/ul/li[5]/a"#),
        )]);
        assert_eq!(
            table.get(Step::SearchSubmenu).unwrap().to_string(),
            r#"//*[@id="contentMenu"]/div[1]/ul/li[5]/a"#
        );
        assert!(matches!(
            LocatorTable::empty().get(Step::HomeLink),
            Err(RobotError::Config(_))
        ));
    }

    #[test]
    fn yaml_keys_are_step_names() {
        let yaml = LocatorTable::defaults().to_yaml().unwrap();
        assert!(yaml.contains("home_link:"));
        assert!(yaml.contains("attachment_dates:"));

        let parsed: LocatorTable =
            serde_yaml::from_str("search_field: 'id:consultarNumeroConvenio'\n").unwrap();
        assert_eq!(
            parsed.get(Step::SearchField).unwrap(),
            &Selector::Id("consultarNumeroConvenio".to_string())
        );
    }
}
