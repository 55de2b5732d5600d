mod direction;
mod tracklet;
mod zone;
mod zone_counter;

pub use direction::{BOX_VOTE_TIE_BREAK, Direction, TieBreak, box_vote, direction_for, resolve};
pub use tracklet::{TrajectorySegment, Tracklet, ZoneRef};
pub use zone::{Point, Polygon, ZoneDirection, ZoneEntry, ZoneSet};
pub use zone_counter::{CountEvent, CounterConfig, ZoneCounter};
