//! HTTPS/JSON transport for [`RobotApi`].
//!
//! Every call is a `POST` to `<base>/<service>/<method>` with a JSON body.
//! After [`RobotApi::authenticate`] the bearer token is attached to every
//! request; the application token, when present, travels as `x-app-token`.

use async_trait::async_trait;
use reqwest::{Certificate, Client, StatusCode};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use time::OffsetDateTime;
use tokio::sync::RwLock;
use tracing::debug;
use url::Url;

use crate::api::RobotApi;
use crate::error::RobotError;
use crate::lease::Lease;
use crate::model::{
    EdgeSnapshot, EstopLevel, Graph, MissionState, MissionStatus, Node, PowerRequest,
    PowerState, RobotCommand, WaypointSnapshot,
};
use crate::robot::Credentials;
use crate::time_sync::{TimeSyncRequest, TimeSyncResponse};

const APP_TOKEN_HEADER: &str = "x-app-token";

pub struct HttpRobotClient {
    http: Client,
    base_url: Url,
    session: RwLock<SessionTokens>,
}

#[derive(Default)]
struct SessionTokens {
    bearer: Option<String>,
    app: Option<String>,
}

impl HttpRobotClient {
    /// Client for `https://<hostname>/api/v1/`. `ca_pem` adds the robot's
    /// certificate authority to the trusted roots.
    pub fn for_hostname(hostname: &str, ca_pem: Option<&[u8]>) -> Result<Self, RobotError> {
        let base_url = Url::parse(&format!("https://{hostname}/api/v1/"))?;
        Self::new(base_url, ca_pem)
    }

    pub fn new(base_url: Url, ca_pem: Option<&[u8]>) -> Result<Self, RobotError> {
        let mut builder = Client::builder().use_rustls_tls();
        if let Some(pem) = ca_pem {
            let cert = Certificate::from_pem(pem)
                .map_err(|err| RobotError::Certificate(err.to_string()))?;
            builder = builder.add_root_certificate(cert);
        }
        Ok(Self {
            http: builder.build()?,
            base_url,
            session: RwLock::new(SessionTokens::default()),
        })
    }

    async fn call<Req, Resp>(&self, path: &str, body: &Req) -> Result<Resp, RobotError>
    where
        Req: Serialize + ?Sized,
        Resp: DeserializeOwned,
    {
        let url = self.base_url.join(path)?;
        debug!(%url, "robot request");
        let mut request = self.http.post(url).json(body);
        {
            let session = self.session.read().await;
            if let Some(token) = session.bearer.as_deref() {
                request = request.bearer_auth(token);
            }
            if let Some(app) = session.app.as_deref() {
                request = request.header(APP_TOKEN_HEADER, app);
            }
        }
        let res = request.send().await?;

        let status = res.status();
        if status.is_success() {
            Ok(res.json::<Resp>().await?)
        } else if status == StatusCode::UNAUTHORIZED {
            Err(RobotError::Unauthenticated)
        } else {
            let body = res.text().await.unwrap_or_default();
            Err(RobotError::UnexpectedStatus { status, body })
        }
    }
}

#[derive(Deserialize)]
struct Ack {}

#[derive(Serialize)]
struct Empty {}

#[derive(Serialize)]
struct AuthRequest<'a> {
    username: &'a str,
    password: &'a str,
}

#[derive(Deserialize)]
struct AuthResponse {
    token: String,
}

#[derive(Serialize)]
struct ResourceRequest<'a> {
    resource: &'a str,
}

#[derive(Serialize)]
struct LeaseRequest<'a> {
    lease: &'a Lease,
}

#[derive(Deserialize)]
struct LeaseResponse {
    lease: Lease,
}

#[derive(Serialize)]
struct UploadGraphRequest<'a> {
    graph: &'a Graph,
    lease: &'a Lease,
}

#[derive(Serialize)]
struct UploadWaypointSnapshotRequest<'a> {
    waypoint_snapshot: &'a WaypointSnapshot,
    lease: &'a Lease,
}

#[derive(Serialize)]
struct UploadEdgeSnapshotRequest<'a> {
    edge_snapshot: &'a EdgeSnapshot,
    lease: &'a Lease,
}

#[derive(Serialize)]
struct LoadMissionRequest<'a> {
    root: &'a Node,
    leases: &'a [Lease],
}

#[derive(Serialize)]
struct PlayRequest<'a> {
    #[serde(with = "time::serde::rfc3339")]
    pause_time: OffsetDateTime,
    leases: &'a [Lease],
}

#[derive(Deserialize)]
struct RestartResponse {
    status: MissionStatus,
}

#[derive(Deserialize)]
struct EstopStatusResponse {
    stop_level: EstopLevel,
}

#[derive(Deserialize)]
struct PowerStateResponse {
    motor_power_state: PowerState,
}

#[derive(Serialize)]
struct PowerCommandRequest<'a> {
    #[serde(flatten)]
    request: PowerRequest,
    lease: &'a Lease,
}

#[derive(Serialize)]
struct RobotCommandRequest<'a> {
    command: RobotCommand,
    lease: &'a Lease,
}

#[async_trait]
impl RobotApi for HttpRobotClient {
    async fn authenticate(&self, credentials: &Credentials) -> Result<(), RobotError> {
        self.session.write().await.app = credentials.app_token.clone();
        let response: AuthResponse = self
            .call(
                "auth/token",
                &AuthRequest {
                    username: &credentials.username,
                    password: &credentials.password,
                },
            )
            .await?;
        self.session.write().await.bearer = Some(response.token);
        Ok(())
    }

    async fn time_sync_round(
        &self,
        request: &TimeSyncRequest,
    ) -> Result<TimeSyncResponse, RobotError> {
        self.call("time_sync/update", request).await
    }

    async fn acquire_lease(&self, resource: &str) -> Result<Lease, RobotError> {
        let response: Result<LeaseResponse, _> = self
            .call("lease/acquire", &ResourceRequest { resource })
            .await;
        match response {
            Ok(response) => Ok(response.lease),
            Err(RobotError::UnexpectedStatus { status, .. }) if status == StatusCode::CONFLICT => {
                Err(RobotError::LeaseUnavailable(resource.to_string()))
            }
            Err(err) => Err(err),
        }
    }

    async fn return_lease(&self, lease: &Lease) -> Result<(), RobotError> {
        let _: Ack = self.call("lease/return", &LeaseRequest { lease }).await?;
        Ok(())
    }

    async fn clear_graph(&self, lease: &Lease) -> Result<(), RobotError> {
        let _: Ack = self
            .call("graph_nav/clear_graph", &LeaseRequest { lease })
            .await?;
        Ok(())
    }

    async fn upload_graph(&self, graph: &Graph, lease: &Lease) -> Result<(), RobotError> {
        let _: Ack = self
            .call("graph_nav/upload_graph", &UploadGraphRequest { graph, lease })
            .await?;
        Ok(())
    }

    async fn upload_waypoint_snapshot(
        &self,
        snapshot: &WaypointSnapshot,
        lease: &Lease,
    ) -> Result<(), RobotError> {
        let _: Ack = self
            .call(
                "graph_nav/upload_waypoint_snapshot",
                &UploadWaypointSnapshotRequest {
                    waypoint_snapshot: snapshot,
                    lease,
                },
            )
            .await?;
        Ok(())
    }

    async fn upload_edge_snapshot(
        &self,
        snapshot: &EdgeSnapshot,
        lease: &Lease,
    ) -> Result<(), RobotError> {
        let _: Ack = self
            .call(
                "graph_nav/upload_edge_snapshot",
                &UploadEdgeSnapshotRequest {
                    edge_snapshot: snapshot,
                    lease,
                },
            )
            .await?;
        Ok(())
    }

    async fn load_mission(&self, root: &Node, leases: &[Lease]) -> Result<(), RobotError> {
        let _: Ack = self
            .call("mission/load", &LoadMissionRequest { root, leases })
            .await?;
        Ok(())
    }

    async fn mission_state(&self) -> Result<MissionState, RobotError> {
        self.call("mission/get_state", &Empty {}).await
    }

    async fn play_mission(
        &self,
        pause_time: OffsetDateTime,
        leases: &[Lease],
    ) -> Result<(), RobotError> {
        let _: Ack = self
            .call("mission/play", &PlayRequest { pause_time, leases })
            .await?;
        Ok(())
    }

    async fn restart_mission(
        &self,
        pause_time: OffsetDateTime,
        leases: &[Lease],
    ) -> Result<MissionStatus, RobotError> {
        let response: RestartResponse = self
            .call("mission/restart", &PlayRequest { pause_time, leases })
            .await?;
        Ok(response.status)
    }

    async fn estop_status(&self) -> Result<EstopLevel, RobotError> {
        let response: EstopStatusResponse = self.call("estop/get_status", &Empty {}).await?;
        Ok(response.stop_level)
    }

    async fn power_state(&self) -> Result<PowerState, RobotError> {
        let response: PowerStateResponse = self.call("robot_state/power", &Empty {}).await?;
        Ok(response.motor_power_state)
    }

    async fn power_command(&self, request: PowerRequest, lease: &Lease) -> Result<(), RobotError> {
        let _: Ack = self
            .call("power/command", &PowerCommandRequest { request, lease })
            .await?;
        Ok(())
    }

    async fn robot_command(&self, command: RobotCommand, lease: &Lease) -> Result<(), RobotError> {
        let _: Ack = self
            .call("robot_command/command", &RobotCommandRequest { command, lease })
            .await?;
        Ok(())
    }
}
