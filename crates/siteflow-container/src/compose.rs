//! docker compose + Docker API によるランタイム実装

// Bollard 0.19 の非推奨APIを一時的に使用
#![allow(deprecated)]

use crate::command::{ExecOutput, OneShot, ServiceCommand, run_command};
use crate::error::{ContainerError, Result};
use crate::runtime::{ContainerDriver, RemovalReport};
use async_trait::async_trait;
use bollard::Docker;
use siteflow_core::site_label_filter;
use std::collections::HashMap;
use std::path::Path;
use tracing::{debug, info, warn};

const DOCKER: &str = "docker";

/// `docker compose` CLI と Docker API を組み合わせたドライバー
///
/// サービスの起動やコマンド実行は compose プロジェクト単位で CLI に委ね、
/// ラベル検索による削除は Docker API で行います。
pub struct ComposeDriver {
    docker: Docker,
    program: String,
}

impl ComposeDriver {
    pub fn new(docker: Docker) -> Self {
        Self {
            docker,
            program: DOCKER.to_string(),
        }
    }

    /// ローカルの Docker に接続
    pub async fn connect() -> Result<Self> {
        let docker = Docker::connect_with_local_defaults()
            .map_err(|e| ContainerError::DockerConnectionFailed(e.to_string()))?;
        docker
            .ping()
            .await
            .map_err(|e| ContainerError::DockerConnectionFailed(e.to_string()))?;
        Ok(Self::new(docker))
    }

    pub fn docker(&self) -> &Docker {
        &self.docker
    }

    async fn compose(&self, workdir: &Path, args: Vec<String>, display: &str) -> Result<ExecOutput> {
        let mut full = vec!["compose".to_string()];
        full.extend(args);
        run_command(&self.program, &full, Some(workdir), display).await
    }

    async fn compose_checked(&self, workdir: &Path, args: Vec<String>) -> Result<()> {
        let display = format!("compose {}", args.join(" "));
        self.compose(workdir, args, &display)
            .await?
            .into_result(format!("docker {}", display))
            .map(|_| ())
    }

    fn label_filters(site_url: &str) -> HashMap<String, Vec<String>> {
        let mut filters = HashMap::new();
        filters.insert("label".to_string(), vec![site_label_filter(site_url)]);
        filters
    }

    async fn remove_containers(&self, site_url: &str, report: &mut RemovalReport) -> Result<()> {
        let options = bollard::container::ListContainersOptions {
            all: true,
            filters: Self::label_filters(site_url),
            ..Default::default()
        };
        let containers = self.docker.list_containers(Some(options)).await?;

        let targets = containers
            .into_iter()
            .filter_map(|container| {
                let id = container.id?;
                let name = container
                    .names
                    .as_ref()
                    .and_then(|n| n.first())
                    .map(|n| n.trim_start_matches('/').to_string())
                    .unwrap_or_else(|| id.clone());
                Some((id, name))
            })
            .collect();

        let docker = &self.docker;
        let outcome = remove_each("container", targets, |id| async move {
            match docker
                .stop_container(&id, None::<bollard::query_parameters::StopContainerOptions>)
                .await
            {
                Ok(_) => {}
                Err(bollard::errors::Error::DockerResponseServerError {
                    status_code: 304 | 404,
                    ..
                }) => {
                    // 既に停止済み / 存在しない
                }
                Err(e) => warn!(container = %id, error = %e, "Failed to stop container"),
            }
            docker
                .remove_container(
                    &id,
                    Some(bollard::query_parameters::RemoveContainerOptions {
                        force: true,
                        v: true,
                        ..Default::default()
                    }),
                )
                .await
        })
        .await;
        report.containers = outcome.removed;
        report.failures.extend(outcome.failures);
        Ok(())
    }

    async fn remove_volumes(&self, site_url: &str, report: &mut RemovalReport) -> Result<()> {
        let options = bollard::volume::ListVolumesOptions {
            filters: Self::label_filters(site_url),
        };
        let response = self.docker.list_volumes(Some(options)).await?;
        let targets = response
            .volumes
            .unwrap_or_default()
            .into_iter()
            .map(|volume| (volume.name.clone(), volume.name))
            .collect();

        let docker = &self.docker;
        let outcome = remove_each("volume", targets, |name| async move {
            docker
                .remove_volume(&name, None::<bollard::query_parameters::RemoveVolumeOptions>)
                .await
        })
        .await;
        report.volumes = outcome.removed;
        report.failures.extend(outcome.failures);
        Ok(())
    }

    async fn remove_networks(&self, site_url: &str, report: &mut RemovalReport) -> Result<()> {
        let options = bollard::network::ListNetworksOptions {
            filters: Self::label_filters(site_url),
        };
        let networks = self.docker.list_networks(Some(options)).await?;
        let targets = networks
            .into_iter()
            .filter_map(|network| network.name)
            .map(|name| (name.clone(), name))
            .collect();

        let docker = &self.docker;
        let outcome = remove_each("network", targets, |name| async move {
            docker.remove_network(&name).await
        })
        .await;
        report.networks = outcome.removed;
        report.failures.extend(outcome.failures);
        Ok(())
    }
}

/// 個別削除の結果
#[derive(Debug, Default)]
struct RemoveOutcome {
    removed: Vec<String>,
    failures: Vec<String>,
}

/// `(id, 表示名)` を1件ずつ削除する
///
/// 404 は削除済みとして無視し、その他の失敗は記録して残りの削除を続けます。
async fn remove_each<F, Fut, T>(kind: &str, targets: Vec<(String, String)>, mut remove: F) -> RemoveOutcome
where
    F: FnMut(String) -> Fut,
    Fut: std::future::Future<Output = std::result::Result<T, bollard::errors::Error>>,
{
    let mut outcome = RemoveOutcome::default();
    for (id, name) in targets {
        match remove(id).await {
            Ok(_) => {
                debug!(kind, name = %name, "Removed");
                outcome.removed.push(name);
            }
            Err(bollard::errors::Error::DockerResponseServerError {
                status_code: 404, ..
            }) => {}
            Err(e) => {
                warn!(kind, name = %name, error = %e, "Failed to remove");
                outcome.failures.push(format!("{} {}: {}", kind, name, e));
            }
        }
    }
    outcome
}

#[async_trait]
impl ContainerDriver for ComposeDriver {
    async fn start(&self, services: &[&str], workdir: &Path) -> Result<()> {
        let mut args = vec!["up".to_string(), "-d".to_string()];
        args.extend(services.iter().map(|s| s.to_string()));
        self.compose_checked(workdir, args).await?;
        info!(services = ?services, "Services started");
        Ok(())
    }

    async fn stop(&self, services: &[&str], workdir: &Path) -> Result<()> {
        let mut args = vec!["stop".to_string()];
        args.extend(services.iter().map(|s| s.to_string()));
        self.compose_checked(workdir, args).await
    }

    async fn restart(&self, services: &[&str], workdir: &Path) -> Result<()> {
        let mut args = vec!["restart".to_string()];
        args.extend(services.iter().map(|s| s.to_string()));
        self.compose_checked(workdir, args).await
    }

    async fn exec(&self, command: &ServiceCommand, workdir: &Path) -> Result<ExecOutput> {
        let mut args = vec!["exec".to_string(), "-T".to_string()];
        if let Some(user) = &command.user {
            args.push("--user".to_string());
            args.push(user.clone());
        }
        if let Some(dir) = &command.workdir {
            args.push("--workdir".to_string());
            args.push(dir.clone());
        }
        args.push(command.service.clone());
        args.extend(command.args.iter().cloned());

        let display = format!("compose exec {}", command);
        self.compose(workdir, args, &display).await
    }

    async fn remove_by_label(&self, site_url: &str) -> Result<RemovalReport> {
        // コンテナ → ボリューム → ネットワークの順（使用中のものは削除できない）
        let mut report = RemovalReport::default();
        if let Err(e) = self.remove_containers(site_url, &mut report).await {
            report.failures.push(format!("list containers: {}", e));
        }
        if let Err(e) = self.remove_volumes(site_url, &mut report).await {
            report.failures.push(format!("list volumes: {}", e));
        }
        if let Err(e) = self.remove_networks(site_url, &mut report).await {
            report.failures.push(format!("list networks: {}", e));
        }
        if !report.failures.is_empty() {
            warn!(site = site_url, failures = report.failures.len(), "Some site resources were not removed");
        }
        Ok(report)
    }

    async fn run_once(&self, probe: &OneShot) -> Result<ExecOutput> {
        let mut args = vec!["run".to_string(), "--rm".to_string()];
        if let Some(network) = &probe.network {
            args.push("--network".to_string());
            args.push(network.clone());
        }
        for volume in &probe.volumes {
            args.push("-v".to_string());
            args.push(volume.clone());
        }
        args.push(probe.image.clone());
        args.extend(probe.args.iter().cloned());

        let display = format!("run --rm {}", probe);
        run_command(&self.program, &args, None, &display).await
    }
}
