/// What the toggle control does.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum CoordinatorMode {
    /// Toggle freezes a still and analyses it once.
    #[default]
    Interactive,
    /// Toggle starts and stops periodic identification of the live feed.
    Continuous,
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum InteractionState {
    /// Live feed with local detection only.
    #[default]
    Idle,
    /// A frozen still is shown and analysed.
    ShowingPreview,
    /// Live feed with periodic remote identification.
    Analyzing,
}

impl InteractionState {
    pub fn toggled(self, mode: CoordinatorMode) -> Self {
        match (self, mode) {
            (InteractionState::Idle, CoordinatorMode::Interactive) => InteractionState::ShowingPreview,
            (InteractionState::Idle, CoordinatorMode::Continuous) => InteractionState::Analyzing,
            (InteractionState::ShowingPreview | InteractionState::Analyzing, _) => {
                InteractionState::Idle
            }
        }
    }

    /// Title of the toggle control in this state.
    pub fn button_title(self) -> &'static str {
        match self {
            InteractionState::Idle => "Analyze",
            InteractionState::ShowingPreview | InteractionState::Analyzing => "Back",
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;

    #[rstest]
    #[case(InteractionState::Idle, CoordinatorMode::Interactive, InteractionState::ShowingPreview)]
    #[case(InteractionState::ShowingPreview, CoordinatorMode::Interactive, InteractionState::Idle)]
    #[case(InteractionState::Idle, CoordinatorMode::Continuous, InteractionState::Analyzing)]
    #[case(InteractionState::Analyzing, CoordinatorMode::Continuous, InteractionState::Idle)]
    fn test_toggle_transitions(
        #[case] from: InteractionState,
        #[case] mode: CoordinatorMode,
        #[case] to: InteractionState,
    ) {
        assert_eq!(from.toggled(mode), to);
    }

    #[test]
    fn test_button_titles() {
        assert_eq!(InteractionState::Idle.button_title(), "Analyze");
        assert_eq!(InteractionState::ShowingPreview.button_title(), "Back");
    }
}
