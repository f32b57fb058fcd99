//! Worker lifecycle states.

use std::fmt;

/// Lifecycle of one worker version.
///
/// `Parsed → Installing → Installed → Activating → Active`, with
/// `Redundant` reachable from install failure or replacement.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Lifecycle {
  /// Constructed, not yet installed
  Parsed,
  Installing,
  /// Installed and waiting to take over
  Installed,
  Activating,
  /// Controls the page and intercepts requests
  Active,
  /// Discarded: failed to install or superseded
  Redundant,
}

impl Lifecycle {
  pub fn name(self) -> &'static str {
    match self {
      Self::Parsed => "parsed",
      Self::Installing => "installing",
      Self::Installed => "installed",
      Self::Activating => "activating",
      Self::Active => "active",
      Self::Redundant => "redundant",
    }
  }

  /// Whether requests are intercepted in this state.
  pub fn controls_page(self) -> bool {
    self == Self::Active
  }
}

impl fmt::Display for Lifecycle {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    f.write_str(self.name())
  }
}
