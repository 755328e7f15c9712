/// A cell on the world grid
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Position {
    pub x: i32,
    pub y: i32,
}

impl Position {
    pub fn new(x: i32, y: i32) -> Self {
        Self { x, y }
    }

    /// Move position by delta
    pub fn moved_by(&self, dx: i32, dy: i32) -> Self {
        Self {
            x: self.x + dx,
            y: self.y + dy,
        }
    }

    /// Move one cell in a heading
    pub fn moved_in(&self, heading: Heading) -> Self {
        let (dx, dy) = heading.delta();
        self.moved_by(dx, dy)
    }

    pub fn distance(&self, other: Position) -> f32 {
        let dx = (self.x - other.x) as f32;
        let dy = (self.y - other.y) as f32;
        (dx * dx + dy * dy).sqrt()
    }
}

/// Direction the agent faces
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Heading {
    North,
    East,
    South,
    West,
}

impl Heading {
    /// Returns the delta (dx, dy) for moving in this heading; y grows southwards
    pub fn delta(&self) -> (i32, i32) {
        match self {
            Heading::North => (0, -1),
            Heading::East => (1, 0),
            Heading::South => (0, 1),
            Heading::West => (-1, 0),
        }
    }

    pub fn turned_left(&self) -> Self {
        match self {
            Heading::North => Heading::West,
            Heading::West => Heading::South,
            Heading::South => Heading::East,
            Heading::East => Heading::North,
        }
    }

    pub fn turned_right(&self) -> Self {
        match self {
            Heading::North => Heading::East,
            Heading::East => Heading::South,
            Heading::South => Heading::West,
            Heading::West => Heading::North,
        }
    }

    /// Angle in radians, clockwise from north
    pub fn angle(&self) -> f32 {
        use std::f32::consts::FRAC_PI_2;
        match self {
            Heading::North => 0.0,
            Heading::East => FRAC_PI_2,
            Heading::South => 2.0 * FRAC_PI_2,
            Heading::West => 3.0 * FRAC_PI_2,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ResourceKind {
    Food,
    Water,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Resource {
    pub position: Position,
    pub kind: ResourceKind,
}

/// Essential variables as deviations from their setpoints
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct Physiology {
    pub food: f32,
    pub water: f32,
    pub temperature: f32,
    pub damage: f32,
}

impl Physiology {
    /// Largest absolute deviation across all variables
    pub fn max_deviation(&self) -> f32 {
        [self.food, self.water, self.temperature, self.damage]
            .into_iter()
            .map(f32::abs)
            .fold(0.0, f32::max)
    }
}

/// Complete state of one episode
#[derive(Debug, Clone, PartialEq)]
pub struct WorldState {
    pub agent: Position,
    pub heading: Heading,
    pub resources: Vec<Resource>,
    pub physiology: Physiology,
    pub grid_size: usize,
    pub steps: usize,
    pub is_alive: bool,
    /// The last FORWARD ran into the boundary
    pub bumped: bool,
}

impl WorldState {
    pub fn is_in_bounds(&self, pos: Position) -> bool {
        let size = self.grid_size as i32;
        (0..size).contains(&pos.x) && (0..size).contains(&pos.y)
    }

    pub fn resource_at(&self, pos: Position) -> Option<usize> {
        self.resources.iter().position(|r| r.position == pos)
    }

    /// Cell the agent faces
    pub fn ahead(&self) -> Position {
        self.agent.moved_in(self.heading)
    }
}
