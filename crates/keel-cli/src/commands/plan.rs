//! Plan command

use std::path::PathBuf;

use clap::Args;
use serde::Deserialize;

use keel_common::model::{ClusterUpdateRequest, NodePoolModel};
use keel_eks::{
    plan_cluster_update, ClusterRef, ClusterUpdatePlan, OrchestratorConfig, StaticImageSelector,
};

use super::{print_json, read_input};
use crate::Result;

#[derive(Args, Debug)]
pub struct PlanArgs {
    /// File holding the cluster, its current node pools and the update request
    pub file: PathBuf,
}

/// Input document of `keel plan`
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PlanInput {
    pub cluster: ClusterRef,
    #[serde(default)]
    pub current: Vec<NodePoolModel>,
    pub request: ClusterUpdateRequest,
}

pub async fn run(args: PlanArgs, config: &OrchestratorConfig) -> Result<()> {
    let input: PlanInput = read_input(&args.file)?;
    let plan = plan(&input, config)?;
    print_json(&plan)
}

fn plan(input: &PlanInput, config: &OrchestratorConfig) -> Result<ClusterUpdatePlan> {
    let images = StaticImageSelector::new(config.images.clone());
    Ok(plan_cluster_update(
        &input.cluster,
        &input.current,
        &input.request,
        Some(&images),
    )?)
}

#[cfg(test)]
mod tests {
    use super::*;

    const INPUT: &str = r#"
cluster:
  clusterId: 7
  clusterName: prod
  kubernetesVersion: "1.29"
current:
  - name: workers
    instanceType: m5.large
    image: ami-old
    volumeSize: 50
  - name: legacy
    instanceType: m5.large
    image: ami-old
    volumeSize: 50
request:
  organizationId: 1
  region: us-west-2
  secretRef: secret-1
  subnets:
    - subnetId: subnet-a
  nodePools:
    workers:
      instanceType: m5.large
      image: ami-new
      minCount: 1
      maxCount: 3
      count: 2
      autoscaling: true
    batch:
      instanceType: c5.xlarge
      minCount: 0
      maxCount: 5
"#;

    fn config() -> OrchestratorConfig {
        OrchestratorConfig::from_yaml(
            r#"
images:
  default:
    "1.29":
      us-west-2: ami-default
"#,
        )
        .unwrap()
    }

    /// Story: an operator previews an update; the new pool picks up the
    /// configured default image and the dropped pool is marked for deletion
    #[test]
    fn story_plan_from_document() {
        let input: PlanInput = serde_yaml::from_str(INPUT).unwrap();
        let plan = plan(&input, &config()).unwrap();

        assert_eq!(plan.created.len(), 1);
        assert_eq!(plan.created[0].name, "batch");
        assert_eq!(plan.created[0].spec.image, "ami-default");
        assert_eq!(plan.created[0].subnet_ids, vec!["subnet-a"]);
        assert_eq!(plan.updates[0].node_pool_name, "workers");
        assert_eq!(plan.deleted, vec!["legacy"]);
    }

    #[test]
    fn plan_without_image_table_reports_missing_image() {
        let input: PlanInput = serde_yaml::from_str(INPUT).unwrap();
        let err = plan(&input, &OrchestratorConfig::default()).unwrap_err();
        assert!(err.to_string().contains("not found"));
    }
}
