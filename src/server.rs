//! Interactive Front End
//!
//! A small axum app serving the dashboard page and one JSON endpoint per
//! plot. Every control change on the page issues one request, and every
//! request runs exactly one render.
use crate::config::ProjectConfig;
use crate::constants::AUTO_INTERACTION;
use crate::data::{AttributionMatrix, Dataset};
use crate::errors::{RenderError, ShapDashError};
use crate::plot::{DependencePlot, Figure, Interaction, SummaryPlot, SummaryPlotType};
use axum::extract::{Query, State};
use axum::http::StatusCode;
use axum::response::{Html, IntoResponse, Response};
use axum::routing::get;
use axum::{Json, Router};
use log::{info, warn};
use serde::{Deserialize, Serialize};
use std::sync::{Arc, Mutex, PoisonError};
use std::time::Instant;

const DASHBOARD_PAGE: &str = include_str!("../assets/dashboard.html");

pub type SharedDashboard = Arc<Dashboard>;

/// Values offered by the page's selectors.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DashboardOptions {
    pub features: Vec<String>,
    /// `auto` followed by every feature.
    pub interactions: Vec<String>,
    pub segments: Vec<String>,
    pub plot_types: Vec<String>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct SummaryControls {
    pub plot_type: Option<String>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct DependenceControls {
    pub feature: Option<String>,
    pub interaction: Option<String>,
    pub median: Option<String>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct SegmentControls {
    pub feature: Option<String>,
    pub segment: Option<String>,
    pub median: Option<String>,
}

fn toggled(value: Option<&str>) -> bool {
    matches!(value.map(str::trim), Some("yes" | "true" | "on" | "1"))
}

fn selected(value: Option<&str>) -> Option<&str> {
    value.map(str::trim).filter(|v| !v.is_empty())
}

/// The data behind the dashboard plus the render gate.
pub struct Dashboard {
    config: ProjectConfig,
    dataset: Dataset,
    attributions: AttributionMatrix,
    render_gate: Mutex<()>,
}

impl std::fmt::Debug for Dashboard {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Dashboard")
            .field("rows", &self.dataset.rows())
            .field("features", &self.attributions.feature_names())
            .finish()
    }
}

impl Dashboard {
    pub fn new(config: ProjectConfig, dataset: Dataset, attributions: AttributionMatrix) -> Result<Self, ShapDashError> {
        if dataset.rows() != attributions.rows() {
            return Err(ShapDashError::Schema(format!(
                "dataset has {} rows but the attribution matrix has {}",
                dataset.rows(),
                attributions.rows()
            )));
        }
        if let Some(missing) = attributions.feature_names().iter().find(|f| !dataset.contains(f)) {
            return Err(ShapDashError::Schema(format!(
                "attributed feature {} is not a column of the dataset",
                missing
            )));
        }
        Ok(Dashboard {
            config,
            dataset,
            attributions,
            render_gate: Mutex::new(()),
        })
    }

    /// Read the training table and its attributions from the configured paths.
    pub fn load(config: ProjectConfig) -> Result<Self, ShapDashError> {
        let dataset = Dataset::from_csv_path(&config.paths.train_x)?;
        let attributions = AttributionMatrix::from_csv_path(&config.paths.shap_values)?;
        info!(
            "Loaded {} rows and {} attributed features",
            dataset.rows(),
            attributions.cols()
        );
        Self::new(config, dataset, attributions)
    }

    /// Columns with few distinct values, plus the continuous columns that are
    /// segmented by quartile.
    pub fn segment_candidates(&self) -> Vec<String> {
        let max = self.config.dashboard.max_segment_cardinality;
        self.dataset
            .iter()
            .filter(|(name, column)| self.config.numeric_cols.contains(*name) || column.n_distinct() <= max)
            .map(|(name, _)| name.clone())
            .collect()
    }

    pub fn options(&self) -> DashboardOptions {
        let features = self.attributions.feature_names().to_vec();
        let mut interactions = vec![AUTO_INTERACTION.to_string()];
        interactions.extend(features.iter().cloned());
        DashboardOptions {
            features,
            interactions,
            segments: self.segment_candidates(),
            plot_types: vec![SummaryPlotType::Dot.to_string(), SummaryPlotType::Bar.to_string()],
        }
    }

    fn figure(&self) -> Figure {
        Figure::new(self.config.dashboard.figure_width, self.config.dashboard.figure_height)
    }

    fn dependence(&self, feature: &str, show_median: bool) -> DependencePlot {
        DependencePlot::new(feature)
            .numeric_cols(self.config.numeric_cols.clone())
            .median(show_median)
            .bins(self.config.dashboard.histogram_bins)
            .target(self.config.target_var.clone())
    }

    /// Render on a fresh figure while holding the render gate, returning the
    /// image as a data URI.
    fn render<F>(&self, what: &str, draw: F) -> Result<String, RenderError>
    where
        F: FnOnce(&mut Figure) -> Result<(), RenderError>,
    {
        let _gate = self.render_gate.lock().unwrap_or_else(PoisonError::into_inner);
        let start = Instant::now();
        let mut figure = self.figure();
        draw(&mut figure)?;
        let uri = figure.to_data_uri()?;
        info!("Rendered {} in {:.3}s", what, start.elapsed().as_secs_f32());
        Ok(uri)
    }

    /// Feature importance tab.
    pub fn summary_plot(&self, controls: &SummaryControls) -> Result<Option<String>, RenderError> {
        let plot_type = match selected(controls.plot_type.as_deref()) {
            Some(v) => v.parse::<SummaryPlotType>()?,
            None => SummaryPlotType::default(),
        };
        let plot = SummaryPlot::new(plot_type);
        self.render("summary plot", |fig| plot.render(fig, &self.dataset, &self.attributions))
            .map(Some)
    }

    /// Dependence tab. `None` when no feature is selected.
    pub fn dependence_plot(&self, controls: &DependenceControls) -> Result<Option<String>, RenderError> {
        let Some(feature) = selected(controls.feature.as_deref()) else {
            return Ok(None);
        };
        let plot = self
            .dependence(feature, toggled(controls.median.as_deref()))
            .interaction(Interaction::parse(controls.interaction.as_deref()));
        self.render("dependence plot", |fig| plot.render(fig, &self.dataset, &self.attributions))
            .map(Some)
    }

    /// Segmented dependence tab. `None` when no feature is selected.
    pub fn segment_plot(&self, controls: &SegmentControls) -> Result<Option<String>, RenderError> {
        let Some(feature) = selected(controls.feature.as_deref()) else {
            return Ok(None);
        };
        let plot = self
            .dependence(feature, toggled(controls.median.as_deref()))
            .segment(selected(controls.segment.as_deref()));
        self.render("segment plot", |fig| plot.render(fig, &self.dataset, &self.attributions))
            .map(Some)
    }
}

/// Build the dashboard router.
pub fn router(dashboard: SharedDashboard) -> Router {
    Router::new()
        .route("/", get(index_handler))
        .route("/api/options", get(options_handler))
        .route("/api/summary", get(summary_handler))
        .route("/api/dependence", get(dependence_handler))
        .route("/api/segment", get(segment_handler))
        .with_state(dashboard)
}

async fn index_handler() -> Html<&'static str> {
    Html(DASHBOARD_PAGE)
}

async fn options_handler(State(dashboard): State<SharedDashboard>) -> Json<DashboardOptions> {
    Json(dashboard.options())
}

async fn summary_handler(State(dashboard): State<SharedDashboard>, Query(controls): Query<SummaryControls>) -> Response {
    respond(dashboard, move |d| d.summary_plot(&controls)).await
}

async fn dependence_handler(
    State(dashboard): State<SharedDashboard>,
    Query(controls): Query<DependenceControls>,
) -> Response {
    respond(dashboard, move |d| d.dependence_plot(&controls)).await
}

async fn segment_handler(State(dashboard): State<SharedDashboard>, Query(controls): Query<SegmentControls>) -> Response {
    respond(dashboard, move |d| d.segment_plot(&controls)).await
}

/// Run a render on the blocking pool and turn its outcome into a response.
async fn respond<F>(dashboard: SharedDashboard, render: F) -> Response
where
    F: FnOnce(&Dashboard) -> Result<Option<String>, RenderError> + Send + 'static,
{
    match tokio::task::spawn_blocking(move || render(dashboard.as_ref())).await {
        Ok(Ok(Some(src))) => Json(serde_json::json!({ "src": src })).into_response(),
        Ok(Ok(None)) => StatusCode::NO_CONTENT.into_response(),
        Ok(Err(e)) => {
            warn!("Render failed: {}", e);
            (StatusCode::UNPROCESSABLE_ENTITY, Json(serde_json::json!({ "error": e.to_string() }))).into_response()
        }
        Err(e) => (
            StatusCode::INTERNAL_SERVER_ERROR,
            Json(serde_json::json!({ "error": e.to_string() })),
        )
            .into_response(),
    }
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        warn!("Unable to listen for shutdown signal: {}", e);
        std::future::pending::<()>().await;
    }
    info!("Shutting down");
}

/// Serve the dashboard until interrupted.
pub async fn serve(dashboard: SharedDashboard, host: &str, port: u16) -> Result<(), std::io::Error> {
    let addr = format!("{}:{}", host, port);
    let listener = tokio::net::TcpListener::bind(&addr).await?;
    info!("Dashboard listening on http://{}", listener.local_addr()?);
    axum::serve(listener, router(dashboard))
        .with_graceful_shutdown(shutdown_signal())
        .await
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::data::Column;
    use axum::body::Body;
    use tower::ServiceExt;

    fn make_dashboard() -> SharedDashboard {
        let dataset = Dataset::from_columns(vec![
            ("age", Column::Numeric(vec![20., 35., 50., 65., 30., 45.])),
            ("income", Column::Numeric(vec![10., 20., 30., 40., 50., 60.])),
            (
                "region",
                Column::Categorical(vec!["n".into(), "s".into(), "n".into(), "e".into(), "s".into(), "n".into()]),
            ),
        ])
        .unwrap();
        let attributions = AttributionMatrix::new(
            vec!["age".to_string(), "income".to_string()],
            vec![vec![0.1, 0.2, 0.3, 0.4, 0.5, 0.6], vec![-1., -0.5, 0., 0.5, 1., 1.5]],
        )
        .unwrap();
        let mut config = ProjectConfig::default();
        config.numeric_cols = ["income".to_string()].into_iter().collect();
        config.dashboard.figure_width = 480;
        config.dashboard.figure_height = 320;
        Arc::new(Dashboard::new(config, dataset, attributions).unwrap())
    }

    fn make_request(uri: &str) -> axum::http::Request<Body> {
        axum::http::Request::builder().uri(uri).body(Body::empty()).unwrap()
    }

    async fn get(uri: &str) -> (StatusCode, Vec<u8>) {
        let app = router(make_dashboard());
        let resp = ServiceExt::<axum::http::Request<Body>>::oneshot(app, make_request(uri))
            .await
            .unwrap();
        let status = resp.status();
        let body = axum::body::to_bytes(resp.into_body(), 1_000_000).await.unwrap();
        (status, body.to_vec())
    }

    #[tokio::test]
    async fn test_options() {
        let (status, body) = get("/api/options").await;
        assert_eq!(status, StatusCode::OK);
        let options: DashboardOptions = serde_json::from_slice(&body).unwrap();
        assert_eq!(options.features, vec!["age", "income"]);
        assert_eq!(options.interactions, vec!["auto", "age", "income"]);
        assert_eq!(options.segments, vec!["income", "region"]);
        assert_eq!(options.plot_types, vec!["dot", "bar"]);
    }

    #[tokio::test]
    async fn test_index_page() {
        let (status, body) = get("/").await;
        assert_eq!(status, StatusCode::OK);
        let page = String::from_utf8(body).unwrap();
        assert!(page.contains("/api/dependence"));
        // Responses to superseded requests are dropped before and after the body is read.
        assert_eq!(page.matches("token !== latest[sectionId]").count(), 2);
    }

    #[tokio::test]
    async fn test_rendered_plots_are_png_data_uris() {
        for uri in [
            "/api/dependence?feature=age&interaction=auto&median=yes",
            "/api/segment?feature=age&segment=income&median=yes",
            "/api/segment?feature=income&segment=region",
            "/api/summary?plot_type=dot",
            "/api/summary",
        ] {
            let (status, body) = get(uri).await;
            assert_eq!(status, StatusCode::OK, "{}", uri);
            let json: serde_json::Value = serde_json::from_slice(&body).unwrap();
            let src = json["src"].as_str().unwrap();
            assert!(src.starts_with("data:image/png;base64,"), "{}", uri);
            assert!(src.len() > "data:image/png;base64,".len());
        }
    }

    #[tokio::test]
    async fn test_empty_feature_is_no_content() {
        for uri in ["/api/dependence", "/api/dependence?feature=", "/api/segment?segment=region"] {
            let (status, body) = get(uri).await;
            assert_eq!(status, StatusCode::NO_CONTENT, "{}", uri);
            assert!(body.is_empty());
        }
    }

    #[tokio::test]
    async fn test_bad_column_is_unprocessable() {
        let (status, body) = get("/api/dependence?feature=height&interaction=auto").await;
        assert_eq!(status, StatusCode::UNPROCESSABLE_ENTITY);
        let json: serde_json::Value = serde_json::from_slice(&body).unwrap();
        assert!(json["error"].as_str().unwrap().contains("height"));

        let (status, body) = get("/api/segment?feature=age&segment=shoe_size").await;
        assert_eq!(status, StatusCode::UNPROCESSABLE_ENTITY);
        let json: serde_json::Value = serde_json::from_slice(&body).unwrap();
        assert!(json["error"].as_str().unwrap().contains("shoe_size"));

        let (status, _) = get("/api/summary?plot_type=violin").await;
        assert_eq!(status, StatusCode::UNPROCESSABLE_ENTITY);
    }

    #[test]
    fn test_controls() {
        assert!(toggled(Some("yes")));
        assert!(!toggled(Some("no")));
        assert!(!toggled(None));
        assert_eq!(selected(Some("  ")), None);
        assert_eq!(selected(Some(" age ")), Some("age"));

        let dashboard = make_dashboard();
        assert_eq!(dashboard.dependence_plot(&DependenceControls::default()), Ok(None));
        assert_eq!(dashboard.segment_plot(&SegmentControls::default()), Ok(None));
    }

    #[test]
    fn test_dashboard_rejects_misaligned_data() {
        let dataset = Dataset::from_columns(vec![("age", Column::Numeric(vec![1., 2.]))]).unwrap();
        let attributions = AttributionMatrix::new(vec!["age".to_string()], vec![vec![0.1]]).unwrap();
        assert!(Dashboard::new(ProjectConfig::default(), dataset.clone(), attributions).is_err());

        let attributions = AttributionMatrix::new(vec!["weight".to_string()], vec![vec![0.1, 0.2]]).unwrap();
        assert!(Dashboard::new(ProjectConfig::default(), dataset, attributions).is_err());
    }
}
