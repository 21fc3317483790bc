//! Threads [`State`] through a whole file.

use super::{Diagnostic, DrawCommand, State, StateOptions, Transition};
use crate::ast::{ApertureBlock, AstVisitor, File, Node, NodeKind, SourceInfo, StepRepeat, walk_node};
use crate::errors::{GerberError, StateError};

/// Interprets a [`File`] command by command.
///
/// Recoverable errors go through the configured
/// [`ErrorPolicy`](super::ErrorPolicy); warnings become diagnostics tagged
/// with the offending command's location.
pub struct StateTracker {
    options: StateOptions,
    state: State,
    commands: Vec<DrawCommand>,
    diagnostics: Vec<Diagnostic>,
    history: Vec<(SourceInfo, State)>,
    stopped: bool,
}

impl StateTracker {
    pub fn new(options: StateOptions) -> StateTracker {
        StateTracker {
            options,
            state: State::new(),
            commands: Vec::new(),
            diagnostics: Vec::new(),
            history: Vec::new(),
            stopped: false,
        }
    }

    pub fn run(&mut self, file: &File) -> Result<(), GerberError> {
        file.visit(self)
    }

    pub fn state(&self) -> &State {
        &self.state
    }

    pub fn commands(&self) -> &[DrawCommand] {
        &self.commands
    }

    pub fn into_commands(self) -> Vec<DrawCommand> {
        self.commands
    }

    pub fn diagnostics(&self) -> &[Diagnostic] {
        &self.diagnostics
    }

    /// `M00` or `M02` ended interpretation
    pub fn is_stopped(&self) -> bool {
        self.stopped
    }

    /// State after the last command starting at or before `offset`.
    /// Needs `record_history`.
    pub fn state_at(&self, offset: usize) -> Option<&State> {
        let index = self.history.partition_point(|(info, _)| info.offset <= offset);
        index.checked_sub(1).map(|i| &self.history[i].1)
    }

    fn step(
        &mut self,
        location: Option<SourceInfo>,
        transition: impl FnOnce(&State, &StateOptions) -> Result<Transition, StateError>,
    ) -> Result<(), GerberError> {
        match transition(&self.state, &self.options) {
            Ok(transition) => {
                for warning in transition.warnings {
                    crate::log::warn!(%warning, "state warning");
                    self.diagnostics.push(Diagnostic::warning(location, warning));
                }
                self.commands.extend(transition.commands);
                self.state = transition.state;
                if transition.stop {
                    crate::log::debug!("program stop");
                    self.stopped = true;
                }
            }
            Err(error) => match self.options.policy.handle(error, location) {
                Ok(Some(diagnostic)) => self.diagnostics.push(diagnostic),
                Ok(None) => {}
                Err(error) => return Err(GerberError::state(error, location)),
            },
        }
        if let (true, Some(info)) = (self.options.record_history, location) {
            self.history.push((info, self.state.clone()));
        }
        Ok(())
    }
}

impl AstVisitor for StateTracker {
    type Error = GerberError;

    fn visit_node(&mut self, node: &Node) -> Result<(), GerberError> {
        if self.stopped {
            return Ok(());
        }
        match &node.kind {
            NodeKind::Ab(_) | NodeKind::Sr(_) => walk_node(self, node),
            _ => self.step(node.source_info, |state, options| state.apply(node, options)),
        }
    }

    fn on_ab_open(&mut self, node: &Node, block: &ApertureBlock) -> Result<(), GerberError> {
        let location = block.open_info.or(node.source_info);
        self.step(location, |state, _| state.open_block(block))
    }

    // Closing runs even after a stop so begin and end stay balanced.
    fn on_ab_close(&mut self, node: &Node, block: &ApertureBlock) -> Result<(), GerberError> {
        let location = block.close_info.or(node.source_info);
        self.step(location, |state, _| state.close_block(block))
    }

    fn on_sr_open(&mut self, node: &Node, block: &StepRepeat) -> Result<(), GerberError> {
        let location = block.open_info.or(node.source_info);
        self.step(location, |state, _| state.open_step_repeat(block))
    }

    fn on_sr_close(&mut self, node: &Node, block: &StepRepeat) -> Result<(), GerberError> {
        let location = block.close_info.or(node.source_info);
        self.step(location, |state, _| Ok(state.close_step_repeat()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ast::{ApertureId, Polarity};
    use crate::parse::{ParseOptions, parse};
    use crate::state::{ErrorPolicy, HookAction, Severity};

    fn track(source: &str, options: StateOptions) -> Result<StateTracker, GerberError> {
        let file = parse(source, &ParseOptions::default()).unwrap();
        let mut tracker = StateTracker::new(options);
        tracker.run(&file)?;
        Ok(tracker)
    }

    const UNDEFINED: &str = "%FSLAX26Y26*%%MOMM*%%ADD10C,1*%D11*D10*X0Y0D03*M02*";

    // ==================== Policies ====================

    #[test]
    fn raise_reports_location() {
        let error = track(UNDEFINED, StateOptions::default()).err().unwrap();
        let GerberError::State { error, location, .. } = error else {
            panic!("expected state error");
        };
        assert_eq!(error, StateError::ApertureNotDefined { id: ApertureId(11) });
        assert_eq!(location.map(|l| l.offset), Some(31));
    }

    #[test]
    fn warn_continues_with_diagnostic() {
        let tracker = track(UNDEFINED, StateOptions::default().with_policy(ErrorPolicy::Warn)).unwrap();
        assert_eq!(tracker.diagnostics().len(), 1);
        assert_eq!(tracker.diagnostics()[0].severity, Severity::Error);
        assert!(tracker.commands().iter().any(|c| matches!(c, DrawCommand::Flash { .. })));
        assert!(tracker.is_stopped());
    }

    #[test]
    fn ignore_is_silent() {
        let tracker = track(UNDEFINED, StateOptions::default().with_policy(ErrorPolicy::Ignore)).unwrap();
        assert!(tracker.diagnostics().is_empty());
    }

    #[test]
    fn hook_can_abort() {
        let policy = ErrorPolicy::hook(|_| HookAction::Abort);
        assert!(track(UNDEFINED, StateOptions::default().with_policy(policy)).is_err());
    }

    #[test]
    fn division_by_zero_is_fatal_under_ignore() {
        let source = "%FSLAX26Y26*%%AMZ*$2=$1/0*1,1,$2,0,0*%%ADD10Z,1*%";
        let result = track(source, StateOptions::default().with_policy(ErrorPolicy::Ignore));
        assert!(matches!(
            result,
            Err(GerberError::State { error: StateError::DivisionByZero { .. }, .. })
        ));
    }

    // ==================== Program stop ====================

    #[test]
    fn stop_ends_interpretation() {
        let source = "%FSLAX26Y26*%%ADD10C,1*%D10*X0Y0D03*M02*X1000000Y0D03*";
        let flashes = |tracker: &StateTracker| {
            tracker
                .commands()
                .iter()
                .filter(|c| matches!(c, DrawCommand::Flash { .. }))
                .count()
        };
        assert_eq!(flashes(&track(source, StateOptions::default()).unwrap()), 1);
        let ignoring = StateOptions::default().with_ignore_program_stop(true);
        assert_eq!(flashes(&track(source, ignoring).unwrap()), 2);
    }

    // ==================== Warnings ====================

    #[test]
    fn warnings_carry_locations() {
        let tracker = track("%FSLAX26Y26*%G70*", StateOptions::default()).unwrap();
        let diagnostic = &tracker.diagnostics()[0];
        assert_eq!(diagnostic.severity, Severity::Warning);
        assert_eq!(diagnostic.range.map(|r| r.offset), Some(13));
    }

    #[test]
    fn region_outlines_are_stroked() {
        let source = "%FSLAX26Y26*%G36*X0Y0D02*X1000000Y0D01*X1000000Y1000000D01*X0Y0D01*G37*";
        let options = StateOptions::default().with_region_outlines(None);
        assert_eq!(track(source, options).unwrap().commands().len(), 1);
        let options = StateOptions::default().with_region_outlines(Some(crate::types::Offset::from_millimeters(
            rust_decimal_macros::dec!(0.1),
        )));
        let tracker = track(source, options).unwrap();
        let lines = tracker
            .commands()
            .iter()
            .filter(|c| matches!(c, DrawCommand::Line { polarity: Polarity::Dark, .. }))
            .count();
        assert_eq!(lines, 3);
    }

    // ==================== History ====================

    #[test]
    fn state_at_offset() {
        let source = "%FSLAX26Y26*%%ADD10C,1*%D10*%LPC*%X0Y0D03*";
        let tracker = track(source, StateOptions::default().with_history(true)).unwrap();
        assert!(tracker.state_at(0).unwrap().format.is_some());
        let before_polarity = tracker.state_at(24).unwrap();
        assert_eq!(before_polarity.current_aperture, Some(ApertureId(10)));
        assert_eq!(before_polarity.transform.polarity, Polarity::Dark);
        assert_eq!(tracker.state_at(source.len()).unwrap().transform.polarity, Polarity::Clear);
        assert!(track(source, StateOptions::default()).unwrap().state_at(0).is_none());
    }

    #[test]
    fn block_children_are_tracked() {
        let source = "%FSLAX26Y26*%%ADD10C,1*%%ABD20*%D10*X0Y0D03*%AB*%";
        let tracker = track(source, StateOptions::default().with_history(true)).unwrap();
        assert!(tracker.state().apertures.contains_key(&ApertureId(20)));
        assert!(tracker.state().open_blocks.is_empty());
        let inside = tracker.state_at(34).unwrap();
        assert_eq!(inside.open_blocks, vec![ApertureId(20)]);
    }
}
