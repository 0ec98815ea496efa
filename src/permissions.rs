use serenity::all::Permissions;

/// What a caller may do, derived from their platform permissions.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Capability {
    ManageGuild,
    ManageMessages,
    ManageChannels,
    KickMembers,
    BanMembers,
    ModerateMembers,
}

impl Capability {
    pub const ALL: [Capability; 6] = [
        Capability::ManageGuild,
        Capability::ManageMessages,
        Capability::ManageChannels,
        Capability::KickMembers,
        Capability::BanMembers,
        Capability::ModerateMembers,
    ];

    pub fn label(self) -> &'static str {
        match self {
            Capability::ManageGuild => "manage server",
            Capability::ManageMessages => "manage messages",
            Capability::ManageChannels => "manage channels",
            Capability::KickMembers => "kick members",
            Capability::BanMembers => "ban members",
            Capability::ModerateMembers => "timeout members",
        }
    }

    fn bit(self) -> u8 {
        1 << (self as u8)
    }

    fn granted_by(self, perms: Permissions) -> bool {
        match self {
            Capability::ManageGuild => perms.manage_guild(),
            Capability::ManageMessages => perms.manage_messages(),
            Capability::ManageChannels => perms.manage_channels(),
            Capability::KickMembers => perms.kick_members(),
            Capability::BanMembers => perms.ban_members(),
            Capability::ModerateMembers => perms.moderate_members(),
        }
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Capabilities {
    bits: u8,
}

impl Capabilities {
    pub fn none() -> Self {
        Self::default()
    }

    pub fn all() -> Self {
        Capability::ALL.into_iter().fold(Self::none(), Self::with)
    }

    pub fn with(mut self, cap: Capability) -> Self {
        self.bits |= cap.bit();
        self
    }

    pub fn from_permissions(perms: Permissions) -> Self {
        if perms.administrator() {
            return Self::all();
        }
        Capability::ALL
            .into_iter()
            .filter(|c| c.granted_by(perms))
            .fold(Self::none(), Self::with)
    }

    pub fn has(&self, cap: Capability) -> bool {
        self.bits & cap.bit() != 0
    }

    pub fn missing(&self, required: &[Capability]) -> Vec<Capability> {
        required.iter().copied().filter(|c| !self.has(*c)).collect()
    }
}
