//! Route scenarios.
//!
//! A scenario is a RON file holding an ASCII map (see
//! [`TileGrid::from_rows`] for the legend), optional structures and player
//! setup, and a list of route requests given in tiles. Running it produces a
//! serializable report with one entry per request.
//!
//! ```ron
//! Scenario(
//!     map: [
//!         "..........",
//!         ".....#....",
//!         ".....#....",
//!     ],
//!     requests: [
//!         (requester: 1, from: (0, 1), to: (9, 2)),
//!         (requester: 2, from: (0, 0), to: (9, 0), propulsion: Lift),
//!     ],
//! )
//! ```

use std::collections::BTreeMap;
use std::path::Path;

use serde::{Deserialize, Serialize};
use tilepath_core::prelude::*;

use crate::error::{Result, ToolError};

/// A structure placed on top of the ASCII map.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StructureSpec {
    /// Top-left tile.
    pub at: (i32, i32),
    /// Footprint size in tiles.
    #[serde(default = "unit_size")]
    pub size: (i32, i32),
    /// Owning player.
    #[serde(default)]
    pub owner: PlayerId,
    /// Whether allied units may pass through.
    #[serde(default)]
    pub gate: bool,
}

fn unit_size() -> (i32, i32) {
    (1, 1)
}

/// One route request, in tile coordinates.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ScenarioRequest {
    /// Requesting entity.
    pub requester: RequesterId,
    /// Origin tile.
    pub from: (i32, i32),
    /// Destination tile.
    pub to: (i32, i32),
    /// Locomotion class.
    #[serde(default = "default_propulsion")]
    pub propulsion: Propulsion,
    /// Owning player.
    #[serde(default)]
    pub player: PlayerId,
    /// Movement intent.
    #[serde(default)]
    pub move_type: MoveType,
    /// Fail instead of returning a partial route.
    #[serde(default)]
    pub reject_nearest: bool,
}

fn default_propulsion() -> Propulsion {
    Propulsion::Wheeled
}

impl ScenarioRequest {
    /// The service request for this entry, between tile centres.
    #[must_use]
    pub fn to_request(&self) -> RouteRequest {
        let from = TileCoord::new(self.from.0, self.from.1);
        let to = TileCoord::new(self.to.0, self.to.1);
        let request = RouteRequest::new(self.requester, from.center(), to.center(), self.propulsion)
            .with_player(self.player)
            .with_move_type(self.move_type);
        if self.reject_nearest {
            request.rejecting_nearest()
        } else {
            request
        }
    }

    fn blocking_key(&self, game_time: u32) -> BlockingKey {
        BlockingKey::new(game_time, self.player, self.propulsion, self.move_type)
    }
}

/// A map plus the requests to run on it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Scenario {
    /// ASCII map rows, top row first.
    pub map: Vec<String>,
    /// Game time the scenario runs at.
    #[serde(default)]
    pub game_time: u32,
    /// Players controlled by humans. Everyone else avoids threatened tiles.
    #[serde(default)]
    pub humans: Vec<PlayerId>,
    /// Allied player pairs.
    #[serde(default)]
    pub alliances: Vec<(PlayerId, PlayerId)>,
    /// Extra structures beyond the 1×1 map symbols.
    #[serde(default)]
    pub structures: Vec<StructureSpec>,
    /// Requests, run in order.
    #[serde(default)]
    pub requests: Vec<ScenarioRequest>,
}

impl Scenario {
    /// Parse a scenario from RON text.
    ///
    /// # Errors
    ///
    /// Returns [`ToolError::Scenario`] if the text is not a valid scenario.
    pub fn from_ron_str(source: &str) -> Result<Self> {
        ron::from_str(source).map_err(|e| ToolError::Scenario {
            path: "<inline>".into(),
            message: e.to_string(),
        })
    }

    /// Load a scenario from a RON file.
    ///
    /// # Errors
    ///
    /// Returns an error if the file cannot be read or parsed.
    pub fn load(path: &Path) -> Result<Self> {
        let source = std::fs::read_to_string(path).map_err(|source| ToolError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        ron::from_str(&source).map_err(|e| ToolError::Scenario {
            path: path.to_path_buf(),
            message: e.to_string(),
        })
    }

    /// Build the world described by this scenario.
    ///
    /// Structures that overlap the map edge or another structure are
    /// skipped with a warning.
    ///
    /// # Errors
    ///
    /// Returns an error if the map rows do not parse.
    pub fn world(&self) -> Result<TileGrid> {
        let mut world = TileGrid::from_rows(&self.map)?;
        world.set_game_time(self.game_time);
        for &player in &self.humans {
            world.set_human(player, true);
        }
        for &(a, b) in &self.alliances {
            world.set_alliance(a, b);
        }
        for spec in &self.structures {
            let top_left = TileCoord::new(spec.at.0, spec.at.1);
            let footprint = NonBlockingArea::from_footprint(top_left, spec.size.0, spec.size.1);
            if !world.place_structure(footprint, spec.owner, spec.gate) {
                tracing::warn!(x = spec.at.0, y = spec.at.1, "skipping structure that does not fit");
            }
        }
        Ok(world)
    }
}

/// Outcome of one scenario request.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RouteReport {
    /// Requesting entity.
    pub requester: RequesterId,
    /// Result status.
    pub status: RouteStatus,
    /// Tiles visited, in order, with repeats collapsed.
    pub tiles: Vec<(i32, i32)>,
    /// Raw waypoints.
    pub waypoints: Vec<WorldPoint>,
    /// Final waypoint, when there is a route.
    pub destination: Option<WorldPoint>,
}

impl RouteReport {
    fn new(requester: RequesterId, outcome: &RouteOutcome) -> Self {
        let status = match outcome {
            RouteOutcome::Ok(_) => RouteStatus::Ok,
            RouteOutcome::Partial(_) => RouteStatus::Partial,
            RouteOutcome::Failed | RouteOutcome::Waiting => RouteStatus::Failed,
        };
        let route = outcome.route();
        let waypoints = route.map(|r| r.path.clone()).unwrap_or_default();
        let mut tiles: Vec<(i32, i32)> = waypoints
            .iter()
            .map(|p| {
                let tile = p.tile();
                (tile.x, tile.y)
            })
            .collect();
        tiles.dedup();
        Self {
            requester,
            status,
            tiles,
            waypoints,
            destination: route.map(|r| r.destination),
        }
    }
}

/// Results of a whole scenario run.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ScenarioReport {
    /// Map width in tiles.
    pub width: i32,
    /// Map height in tiles.
    pub height: i32,
    /// One entry per request, in order.
    pub routes: Vec<RouteReport>,
}

/// Run every request of `scenario` and wait for each answer.
///
/// # Errors
///
/// Returns an error if the map does not parse or the service cannot start.
pub fn run_scenario(scenario: &Scenario, config: PathfindingConfig) -> Result<ScenarioReport> {
    let world = scenario.world()?;
    let mut service = PathfindingService::new(config)?;

    let routes = scenario
        .requests
        .iter()
        .map(|entry| {
            let outcome = service.wait_route(&world, &entry.to_request());
            let report = RouteReport::new(entry.requester, &outcome);
            tracing::info!(
                requester = entry.requester,
                status = ?report.status,
                steps = report.tiles.len(),
                "route finished"
            );
            report
        })
        .collect();

    Ok(ScenarioReport {
        width: world.width(),
        height: world.height(),
        routes,
    })
}

/// Sync checksums of one blocking map.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChecksumReport {
    /// Owning player.
    pub player: PlayerId,
    /// Locomotion class.
    pub propulsion: Propulsion,
    /// Movement intent.
    pub move_type: MoveType,
    /// Checksum of the blocked layer, as hex.
    pub checksum: String,
    /// Checksum of the danger layer, as hex.
    pub danger_checksum: String,
}

/// Checksums of every distinct blocking map the scenario's requests use.
///
/// # Errors
///
/// Returns an error if the map does not parse.
pub fn blocking_checksums(scenario: &Scenario) -> Result<Vec<ChecksumReport>> {
    let world = scenario.world()?;
    let mut table = BlockingMapTable::new();
    let mut seen = BTreeMap::new();

    for entry in &scenario.requests {
        let key = entry.blocking_key(world.game_time());
        let map = table.get_or_build(&world, key);
        let label = format!("{}/{:?}/{:?}", key.player, key.propulsion, key.move_type);
        seen.entry(label).or_insert_with(|| ChecksumReport {
            player: key.player,
            propulsion: key.propulsion,
            move_type: key.move_type,
            checksum: format!("{:08X}", map.checksum()),
            danger_checksum: format!("{:08X}", map.danger_checksum()),
        });
    }
    Ok(seen.into_values().collect())
}
