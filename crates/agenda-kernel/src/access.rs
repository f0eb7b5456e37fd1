use crate::command::ManageAction;

/// Outcome of an ownership check on a record.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Access {
    /// Permitted. `on_behalf` is set when an admin acts on someone else's record.
    Allowed { on_behalf: bool },
    /// Neither owner nor admin.
    NotOwner,
    /// Admin acting on another user's record where only owners may act.
    AdminCannotEdit,
}

/// What a viewer may do with one record; drives which buttons are rendered.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ManageRight {
    pub complete: bool,
    pub edit: bool,
    pub delete: bool,
}

impl ManageRight {
    pub fn for_viewer(viewer: &str, owner: &str, viewer_is_admin: bool) -> Self {
        let allowed = |action| {
            matches!(
                authorize(action, viewer, owner, viewer_is_admin),
                Access::Allowed { .. }
            )
        };
        Self {
            complete: allowed(ManageAction::Complete),
            edit: allowed(ManageAction::Edit),
            delete: allowed(ManageAction::Delete),
        }
    }

    pub fn any(&self) -> bool {
        self.complete || self.edit || self.delete
    }
}

/// Owners may do anything to their records. Admins may complete or delete
/// any record but edit only their own.
pub fn authorize(action: ManageAction, requester: &str, owner: &str, is_admin: bool) -> Access {
    let is_owner = requester == owner;
    if is_owner {
        return Access::Allowed { on_behalf: false };
    }
    if !is_admin {
        return Access::NotOwner;
    }
    match action {
        ManageAction::Edit => Access::AdminCannotEdit,
        ManageAction::Delete | ManageAction::ConfirmDelete | ManageAction::Complete => {
            Access::Allowed { on_behalf: true }
        }
    }
}
