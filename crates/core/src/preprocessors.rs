//! Implicit weights required by controlnet-aux preprocessor nodes.
//!
//! Preprocessor nodes load their models from disk by name at run time, so
//! those weights never appear as inputs in the workflow JSON. This module
//! maps each preprocessor class type to the weights it needs and generates
//! the manifest entries for the auxiliary model bundle.

use crate::manifest::{FetchSpec, ManifestEntry, SourceProtocol};
use crate::workflow::WorkflowNode;

/// Auxiliary model files and the repository sub-path they live under in
/// the controlnet-aux checkpoint directory.
pub const CONTROLNET_AUX_MODELS: &[(&str, &str)] = &[
    ("UNet.pth", "bdsqlsz/qinglong_controlnet-lllite/Annotators"),
    ("mobile_sam.pt", "dhkim2810/MobileSAM"),
    ("hrnetv2_w64_imagenet_pretrained.pth", "hr16/ControlNet-HandRefiner-pruned"),
    ("graphormer_hand_state_dict.bin", "hr16/ControlNet-HandRefiner-pruned"),
    ("rtmpose-m_ap10k_256_bs5.torchscript.pt", "hr16/DWPose-TorchScript-BatchSize5"),
    ("dw-ll_ucoco_384_bs5.torchscript.pt", "hr16/DWPose-TorchScript-BatchSize5"),
    ("rtmpose-m_ap10k_256.onnx", "hr16/UnJIT-DWPose"),
    ("yolo_nas_s_fp16.onnx", "hr16/yolo-nas-fp16"),
    ("yolo_nas_m_fp16.onnx", "hr16/yolo-nas-fp16"),
    ("yolox_l.torchscript.pt", "hr16/yolox-onnx"),
    ("densepose_r101_fpn_dl.torchscript", "LayerNorm/DensePose-TorchScript-with-hint-image"),
    ("densepose_r50_fpn_dl.torchscript", "LayerNorm/DensePose-TorchScript-with-hint-image"),
    ("mlsd_large_512_fp32.pth", "lllyasviel/Annotators"),
    ("150_16_swin_l_oneformer_coco_100ep.pth", "lllyasviel/Annotators"),
    ("ControlNetHED.pth", "lllyasviel/Annotators"),
    ("ZoeD_M12_N.pt", "lllyasviel/Annotators"),
    ("scannet.pt", "lllyasviel/Annotators"),
    ("hand_pose_model.pth", "lllyasviel/Annotators"),
    ("upernet_global_small.pth", "lllyasviel/Annotators"),
    ("latest_net_G.pth", "lllyasviel/Annotators"),
    ("netG.pth", "lllyasviel/Annotators"),
    ("sk_model2.pth", "lllyasviel/Annotators"),
    ("dpt_hybrid-midas-501f0c75.pt", "lllyasviel/Annotators"),
    ("table5_pidinet.pth", "lllyasviel/Annotators"),
    ("erika.pth", "lllyasviel/Annotators"),
    ("250_16_swin_l_oneformer_ade20k_160k.pth", "lllyasviel/Annotators"),
    ("sk_model.pth", "lllyasviel/Annotators"),
    ("body_pose_model.pth", "lllyasviel/Annotators"),
    ("res101.pth", "lllyasviel/Annotators"),
    ("facenet.pth", "lllyasviel/Annotators"),
    ("isnetis.ckpt", "skytnt/anime-seg"),
    ("yolox_l.onnx", "yzd-v/DWPose"),
    ("dw-ll_ucoco_384.onnx", "yzd-v/DWPose"),
];

const CONTROLNET_AUX_CKPTS_DIR: &str = "ComfyUI/custom_nodes/comfyui_controlnet_aux/ckpts";

/// Build mirror manifest entries for every auxiliary model.
pub fn controlnet_aux_entries(mirror_base_url: &str) -> Vec<(String, ManifestEntry)> {
    CONTROLNET_AUX_MODELS
        .iter()
        .map(|(identifier, repo)| {
            let spec = FetchSpec {
                url: format!(
                    "{mirror_base_url}/custom_nodes/comfyui_controlnet_aux/{identifier}.tar"
                ),
                dest: format!("{CONTROLNET_AUX_CKPTS_DIR}/{repo}"),
                source: SourceProtocol::Mirror,
                license_restricted: false,
                file: None,
            };
            (identifier.to_string(), ManifestEntry::Single(spec))
        })
        .collect()
}

// ---------------------------------------------------------------------------
// Preprocessor classes
// ---------------------------------------------------------------------------

/// Preprocessor node classes that need weights not declared as graph inputs.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum PreprocessorClass {
    // Depth
    MidasNormalMap,
    MidasDepthMap,
    ZoeDepthMap,
    LeresDepthMap,
    MeshGraphormerDepthMap,
    // Segmentation
    BaeNormalMap,
    OneFormerCoco,
    OneFormerAde20k,
    UniFormerSemSeg,
    SemSeg,
    AnimeFaceSemSeg,
    Sam,
    // Line extractors
    AnimeLineArt,
    Hed,
    FakeScribble,
    Mlsd,
    PiDiNet,
    LineArt,
    Manga2AnimeLineArt,
    // Pose
    Openpose,
}

impl PreprocessorClass {
    pub const ALL: &'static [PreprocessorClass] = &[
        Self::MidasNormalMap,
        Self::MidasDepthMap,
        Self::ZoeDepthMap,
        Self::LeresDepthMap,
        Self::MeshGraphormerDepthMap,
        Self::BaeNormalMap,
        Self::OneFormerCoco,
        Self::OneFormerAde20k,
        Self::UniFormerSemSeg,
        Self::SemSeg,
        Self::AnimeFaceSemSeg,
        Self::Sam,
        Self::AnimeLineArt,
        Self::Hed,
        Self::FakeScribble,
        Self::Mlsd,
        Self::PiDiNet,
        Self::LineArt,
        Self::Manga2AnimeLineArt,
        Self::Openpose,
    ];

    /// ComfyUI `class_type` tag for this preprocessor.
    pub fn class_type(&self) -> &'static str {
        match self {
            Self::MidasNormalMap => "MiDaS-NormalMapPreprocessor",
            Self::MidasDepthMap => "MiDaS-DepthMapPreprocessor",
            Self::ZoeDepthMap => "Zoe-DepthMapPreprocessor",
            Self::LeresDepthMap => "LeReS-DepthMapPreprocessor",
            Self::MeshGraphormerDepthMap => "MeshGraphormer-DepthMapPreprocessor",
            Self::BaeNormalMap => "BAE-NormalMapPreprocessor",
            Self::OneFormerCoco => "OneFormer-COCO-SemSegPreprocessor",
            Self::OneFormerAde20k => "OneFormer-ADE20K-SemSegPreprocessor",
            Self::UniFormerSemSeg => "UniFormer-SemSegPreprocessor",
            Self::SemSeg => "SemSegPreprocessor",
            Self::AnimeFaceSemSeg => "AnimeFace_SemSegPreprocessor",
            Self::Sam => "SAMPreprocessor",
            Self::AnimeLineArt => "AnimeLineArtPreprocessor",
            Self::Hed => "HEDPreprocessor",
            Self::FakeScribble => "FakeScribblePreprocessor",
            Self::Mlsd => "M-LSDPreprocessor",
            Self::PiDiNet => "PiDiNetPreprocessor",
            Self::LineArt => "LineArtPreprocessor",
            Self::Manga2AnimeLineArt => "Manga2Anime_LineArt_Preprocessor",
            Self::Openpose => "OpenposePreprocessor",
        }
    }

    /// Parse a `class_type` tag. Returns `None` for any other node class.
    pub fn from_class_type(class_type: &str) -> Option<Self> {
        Self::ALL
            .iter()
            .copied()
            .find(|class| class.class_type() == class_type)
    }

    /// Weights this preprocessor loads at run time, in load order.
    pub fn implied_weights(&self) -> &'static [&'static str] {
        match self {
            Self::MidasNormalMap | Self::MidasDepthMap => &["dpt_hybrid-midas-501f0c75.pt"],
            Self::ZoeDepthMap => &["ZoeD_M12_N.pt"],
            Self::LeresDepthMap => &["res101.pth", "latest_net_G.pth"],
            Self::MeshGraphormerDepthMap => &[
                "hrnetv2_w64_imagenet_pretrained.pth",
                "graphormer_hand_state_dict.bin",
            ],
            Self::BaeNormalMap => &["scannet.pt"],
            Self::OneFormerCoco => &["150_16_swin_l_oneformer_coco_100ep.pth"],
            Self::OneFormerAde20k => &["250_16_swin_l_oneformer_ade20k_160k.pth"],
            Self::UniFormerSemSeg | Self::SemSeg => &["upernet_global_small.pth"],
            Self::AnimeFaceSemSeg => &["UNet.pth", "isnetis.ckpt"],
            Self::Sam => &["mobile_sam.pt"],
            Self::AnimeLineArt => &["netG.pth"],
            Self::Hed | Self::FakeScribble => &["ControlNetHED.pth"],
            Self::Mlsd => &["mlsd_large_512_fp32.pth"],
            Self::PiDiNet => &["table5_pidinet.pth"],
            Self::LineArt => &["sk_model.pth", "sk_model2.pth"],
            Self::Manga2AnimeLineArt => &["erika.pth"],
            Self::Openpose => &["body_pose_model.pth", "hand_pose_model.pth", "facenet.pth"],
        }
    }
}

// ---------------------------------------------------------------------------
// Detection
// ---------------------------------------------------------------------------

/// Weights implied by a single node. Nodes without a class type, or with a
/// class type that is not a preprocessor, imply nothing.
pub fn detect(node: &WorkflowNode) -> &'static [&'static str] {
    node.class_type
        .as_deref()
        .and_then(PreprocessorClass::from_class_type)
        .map(|class| class.implied_weights())
        .unwrap_or(&[])
}

/// Weights implied by every node in a workflow, deduplicated in first-seen
/// order.
pub fn detect_implied_weights(nodes: &[WorkflowNode]) -> Vec<String> {
    let mut weights: Vec<String> = Vec::new();
    for node in nodes {
        for weight in detect(node) {
            if !weights.iter().any(|w| w.as_str() == *weight) {
                weights.push((*weight).to_string());
            }
        }
    }
    weights
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn node(id: &str, class_type: Option<&str>) -> WorkflowNode {
        WorkflowNode {
            id: id.to_string(),
            class_type: class_type.map(str::to_string),
            inputs: json!({}),
            title: None,
        }
    }

    // -- class lookup --------------------------------------------------------

    #[test]
    fn every_class_round_trips_through_its_tag() {
        for class in PreprocessorClass::ALL {
            assert_eq!(
                PreprocessorClass::from_class_type(class.class_type()),
                Some(*class)
            );
        }
    }

    #[test]
    fn non_preprocessor_class_is_none() {
        assert_eq!(PreprocessorClass::from_class_type("KSampler"), None);
        assert_eq!(PreprocessorClass::from_class_type(""), None);
    }

    #[test]
    fn every_implied_weight_is_an_aux_model() {
        for class in PreprocessorClass::ALL {
            for weight in class.implied_weights() {
                assert!(
                    CONTROLNET_AUX_MODELS.iter().any(|(id, _)| id == weight),
                    "{weight} implied by {} is missing from the aux table",
                    class.class_type()
                );
            }
        }
    }

    // -- detect --------------------------------------------------------------

    #[test]
    fn openpose_implies_three_weights() {
        let weights = detect_implied_weights(&[node("1", Some("OpenposePreprocessor"))]);
        assert_eq!(
            weights,
            vec!["body_pose_model.pth", "hand_pose_model.pth", "facenet.pth"]
        );
    }

    #[test]
    fn repeated_nodes_do_not_duplicate() {
        let nodes = vec![
            node("1", Some("OpenposePreprocessor")),
            node("2", Some("OpenposePreprocessor")),
            node("3", Some("HEDPreprocessor")),
            node("4", Some("FakeScribblePreprocessor")),
        ];
        let weights = detect_implied_weights(&nodes);
        assert_eq!(
            weights,
            vec![
                "body_pose_model.pth",
                "hand_pose_model.pth",
                "facenet.pth",
                "ControlNetHED.pth",
            ]
        );
    }

    #[test]
    fn detection_is_idempotent() {
        let nodes = vec![node("1", Some("LineArtPreprocessor"))];
        assert_eq!(detect_implied_weights(&nodes), detect_implied_weights(&nodes));
    }

    #[test]
    fn node_without_class_type_is_skipped() {
        let nodes = vec![node("1", None), node("2", Some("SAMPreprocessor"))];
        assert_eq!(detect_implied_weights(&nodes), vec!["mobile_sam.pt"]);
        assert!(detect(&nodes[0]).is_empty());
    }

    #[test]
    fn ordinary_nodes_imply_nothing() {
        let nodes = vec![node("1", Some("KSampler")), node("2", Some("VAEDecode"))];
        assert!(detect_implied_weights(&nodes).is_empty());
    }

    // -- controlnet_aux_entries ----------------------------------------------

    #[test]
    fn aux_entries_use_mirror_tarballs() {
        let entries = controlnet_aux_entries("https://m.test");
        assert_eq!(entries.len(), CONTROLNET_AUX_MODELS.len());
        let (id, entry) = entries
            .iter()
            .find(|(id, _)| id == "isnetis.ckpt")
            .unwrap();
        assert_eq!(id, "isnetis.ckpt");
        let spec = &entry.specs()[0];
        assert_eq!(
            spec.url,
            "https://m.test/custom_nodes/comfyui_controlnet_aux/isnetis.ckpt.tar"
        );
        assert_eq!(
            spec.dest,
            "ComfyUI/custom_nodes/comfyui_controlnet_aux/ckpts/skytnt/anime-seg"
        );
        assert_eq!(spec.source, SourceProtocol::Mirror);
    }
}
