//! Street network approximated by straight lines.
//!
//! Durations are `distance / speed`. Useful for modes without a real router
//! (e.g. taxi) and for running the gateway without any street-network backend.

use chrono::TimeDelta;
use futures::FutureExt;
use futures::future::BoxFuture;

use crate::domain::{
    FallbackMode, FeedPublisher, Journey, PlannerResponse, RoutingStatus, Section, SectionType,
};
use crate::request::PeriodExtremity;

use super::{
    DirectPathRequest, MatrixCell, MatrixRequest, PathKey, ProviderError, RoutingMatrix,
    StreetNetworkPathType, StreetNetworkProvider,
};

/// Street-network provider drawing straight lines between places.
#[derive(Debug, Clone)]
pub struct CrowflyStreetNetwork {
    id: String,
    feed_publisher: Option<FeedPublisher>,
}

impl CrowflyStreetNetwork {
    pub fn new(id: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            feed_publisher: None,
        }
    }

    pub fn with_feed_publisher(mut self, fp: FeedPublisher) -> Self {
        self.feed_publisher = Some(fp);
        self
    }

    fn cell(&self, distance: f64, speed: f64, max_duration: u32, projectable: bool) -> MatrixCell {
        if !projectable || speed <= 0.0 {
            return MatrixCell {
                duration: 0,
                status: RoutingStatus::Unknown,
            };
        }
        let duration = (distance / speed).round() as u32;
        let status = if duration <= max_duration {
            RoutingStatus::Reached
        } else {
            RoutingStatus::Unreached
        };
        MatrixCell { duration, status }
    }

    fn compute_matrix(&self, request: &MatrixRequest) -> RoutingMatrix {
        let speed = request.speeds.for_mode(request.mode);
        let rows = request
            .origins
            .iter()
            .map(|origin| {
                request
                    .destinations
                    .iter()
                    .map(|dest| {
                        let projectable = origin.coord.is_valid() && dest.coord.is_valid();
                        let distance = origin.coord.distance_to(&dest.coord);
                        self.cell(distance, speed, request.max_duration, projectable)
                    })
                    .collect()
            })
            .collect();
        RoutingMatrix { rows }
    }

    fn compute_direct_path(&self, request: &DirectPathRequest) -> PlannerResponse {
        let (origin, destination) = (&request.origin, &request.destination);
        let speed = request.speeds.for_mode(request.mode);
        if !origin.coord.is_valid() || !destination.coord.is_valid() || speed <= 0.0 {
            return PlannerResponse::default();
        }

        let distance = origin.coord.distance_to(&destination.coord);
        let duration = TimeDelta::seconds((distance / speed).round() as i64);
        let (begin, end) = if request.represents_start {
            (request.datetime, request.datetime + duration)
        } else {
            (request.datetime - duration, request.datetime)
        };

        let mut section = Section::new(
            SectionType::StreetNetwork,
            origin.clone(),
            destination.clone(),
            begin,
            end,
        );
        section.mode = Some(street_mode(request.mode));
        section.length = distance.round() as u32;
        section.geometry = vec![origin.coord, destination.coord];

        let mut response = PlannerResponse::default();
        if let Some(journey) = Journey::from_sections(vec![section]) {
            response.journeys.push(journey);
        }
        if let Some(fp) = &self.feed_publisher {
            response.add_feed_publisher(fp.clone());
        }
        response
    }
}

/// Mode drawn on the street-network section.
fn street_mode(mode: FallbackMode) -> FallbackMode {
    match mode {
        FallbackMode::CarNoPark => FallbackMode::Car,
        other => other,
    }
}

impl StreetNetworkProvider for CrowflyStreetNetwork {
    fn id(&self) -> &str {
        &self.id
    }

    fn routing_matrix(
        &self,
        request: MatrixRequest,
    ) -> BoxFuture<'_, Result<RoutingMatrix, ProviderError>> {
        let matrix = self.compute_matrix(&request);
        async move { Ok(matrix) }.boxed()
    }

    fn direct_path(
        &self,
        request: DirectPathRequest,
    ) -> BoxFuture<'_, Result<PlannerResponse, ProviderError>> {
        let response = self.compute_direct_path(&request);
        async move { Ok(response) }.boxed()
    }

    /// Straight lines do not depend on time, except for direct paths whose
    /// datetimes are returned as computed.
    fn make_path_key(
        &self,
        mode: FallbackMode,
        origin_uri: &str,
        destination_uri: &str,
        path_type: StreetNetworkPathType,
        extremity: PeriodExtremity,
    ) -> PathKey {
        PathKey {
            mode,
            origin_uri: origin_uri.to_string(),
            destination_uri: destination_uri.to_string(),
            path_type,
            extremity: (path_type == StreetNetworkPathType::Direct).then_some(extremity),
        }
    }

    fn feed_publisher(&self) -> Option<FeedPublisher> {
        self.feed_publisher.clone()
    }
}
