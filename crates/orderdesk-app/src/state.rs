// Copyright 2026 Phillip Cloud
// Licensed under the Apache License, Version 2.0

/// Shared status/error surface every resolver reports to.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct StatusBoard {
    pub status_line: Option<String>,
    pub error_line: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StatusCommand {
    SetStatus(String),
    SetError(String),
    ClearError,
}

impl StatusBoard {
    pub fn dispatch(&mut self, command: StatusCommand) {
        match command {
            StatusCommand::SetStatus(message) => self.status_line = Some(message),
            StatusCommand::SetError(message) => self.error_line = Some(message),
            StatusCommand::ClearError => self.error_line = None,
        }
    }

    pub fn status(&self) -> &str {
        self.status_line.as_deref().unwrap_or("")
    }

    pub fn error(&self) -> &str {
        self.error_line.as_deref().unwrap_or("")
    }
}

#[cfg(test)]
mod tests {
    use super::{StatusBoard, StatusCommand};

    #[test]
    fn error_and_status_are_independent() {
        let mut board = StatusBoard::default();
        board.dispatch(StatusCommand::SetStatus("resolving product 534687".to_owned()));
        board.dispatch(StatusCommand::SetError("GET failed".to_owned()));

        assert_eq!(board.status(), "resolving product 534687");
        assert_eq!(board.error(), "GET failed");

        board.dispatch(StatusCommand::ClearError);
        assert_eq!(board.error(), "");
        assert_eq!(board.status(), "resolving product 534687");
    }
}
