#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SimCondition {
    Normal,
    Attack,
}

impl SimCondition {
    pub fn toggled(&self) -> SimCondition {
        match self {
            SimCondition::Normal => SimCondition::Attack,
            SimCondition::Attack => SimCondition::Normal,
        }
    }
}

impl std::fmt::Display for SimCondition {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let result = match self {
            SimCondition::Normal => "normal",
            SimCondition::Attack => "attack",
        };

        write!(f, "{}", result)
    }
}

#[derive(Debug, Clone)]
pub enum SimCommand {
    SetCondition(SimCondition),
    ToggleCondition,
}
