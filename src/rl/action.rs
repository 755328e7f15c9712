/// Discrete actions understood by the simulator
///
/// Indices match the simulator's action numbering. Environments may expose
/// only a prefix of this list (the built-in world uses the first five).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ActionType {
    None = 0,
    Forward = 1,
    Left = 2,
    Right = 3,
    Eat = 4,
    IncreaseE = 5,
    IncreaseT = 6,
    IncreaseB = 7,
}

impl ActionType {
    pub const ALL: [ActionType; 8] = [
        ActionType::None,
        ActionType::Forward,
        ActionType::Left,
        ActionType::Right,
        ActionType::Eat,
        ActionType::IncreaseE,
        ActionType::IncreaseT,
        ActionType::IncreaseB,
    ];

    pub fn from_index(index: usize) -> Option<Self> {
        Self::ALL.get(index).copied()
    }

    pub fn index(self) -> usize {
        self as usize
    }

    /// Actions that cost no energy and carry no shaping penalty
    pub fn is_free(self) -> bool {
        matches!(self, ActionType::None | ActionType::Left | ActionType::Right)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_index_roundtrip() {
        for action in ActionType::ALL {
            assert_eq!(ActionType::from_index(action.index()), Some(action));
        }
        assert_eq!(ActionType::from_index(8), None);
    }

    #[test]
    fn test_free_actions() {
        assert!(ActionType::None.is_free());
        assert!(ActionType::Left.is_free());
        assert!(ActionType::Right.is_free());
        assert!(!ActionType::Forward.is_free());
        assert!(!ActionType::Eat.is_free());
    }
}
