#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Affiliation {
    Owner,
    Collaborator,
    OrganizationMember,
}

impl Affiliation {
    pub const ALL: [Affiliation; 3] = [
        Affiliation::Owner,
        Affiliation::Collaborator,
        Affiliation::OrganizationMember,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Affiliation::Owner => "OWNER",
            Affiliation::Collaborator => "COLLABORATOR",
            Affiliation::OrganizationMember => "ORGANIZATION_MEMBER",
        }
    }
}

/// A repository as listed for the user, with the commit count of its default
/// branch. `commit_count` is `None` when the repository has no default branch.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RepositoryEdge {
    pub name_with_owner: String,
    pub commit_count: Option<u64>,
}

impl RepositoryEdge {
    pub fn new(name_with_owner: impl Into<String>, commit_count: Option<u64>) -> Self {
        Self {
            name_with_owner: name_with_owner.into(),
            commit_count,
        }
    }

    pub fn owner_and_name(&self) -> Option<(&str, &str)> {
        let (owner, name) = self.name_with_owner.split_once('/')?;
        if owner.is_empty() || name.is_empty() {
            return None;
        }
        Some((owner, name))
    }
}
