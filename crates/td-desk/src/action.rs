// action.rs — Action tokens carried by controls and forms.
//
// Every control the desk posts carries an opaque token; clicking it hands the
// token back with the interaction. The format is plain text so it survives
// any platform's custom-id field:
//
//   create:<kind>               open a ticket of <kind>
//   close-request:<creatorId>   ask to close the ticket in this space
//   close-confirm[:<window>]    confirm a pending close
//   close-cancel[:<window>]     cancel a pending close
//
// The window suffix pins a confirm/cancel control to the close request that
// produced it; controls from an earlier request then do nothing.

use std::fmt;
use std::str::FromStr;

use td_ticket::{TicketKind, UserId};

use crate::error::DeskError;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ActionToken {
    Create(TicketKind),
    CloseRequest { creator: UserId },
    CloseConfirm { window: Option<u64> },
    CloseCancel { window: Option<u64> },
}

impl fmt::Display for ActionToken {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ActionToken::Create(kind) => write!(f, "create:{}", kind),
            ActionToken::CloseRequest { creator } => write!(f, "close-request:{}", creator),
            ActionToken::CloseConfirm { window: None } => write!(f, "close-confirm"),
            ActionToken::CloseConfirm { window: Some(w) } => write!(f, "close-confirm:{}", w),
            ActionToken::CloseCancel { window: None } => write!(f, "close-cancel"),
            ActionToken::CloseCancel { window: Some(w) } => write!(f, "close-cancel:{}", w),
        }
    }
}

impl FromStr for ActionToken {
    type Err = DeskError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let unknown = || DeskError::UnknownAction(s.to_string());
        let (verb, arg) = match s.split_once(':') {
            Some((verb, arg)) => (verb, Some(arg)),
            None => (s, None),
        };
        let window = |arg: Option<&str>| -> Result<Option<u64>, DeskError> {
            arg.map(|a| a.parse().map_err(|_| unknown())).transpose()
        };

        match verb {
            "create" => arg
                .and_then(|a| a.parse().ok())
                .map(ActionToken::Create)
                .ok_or_else(unknown),
            "close-request" => arg
                .and_then(|a| a.parse().ok())
                .map(|creator| ActionToken::CloseRequest { creator })
                .ok_or_else(unknown),
            "close-confirm" => Ok(ActionToken::CloseConfirm { window: window(arg)? }),
            "close-cancel" => Ok(ActionToken::CloseCancel { window: window(arg)? }),
            _ => Err(unknown()),
        }
    }
}
