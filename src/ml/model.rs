use burn::{
    module::AutodiffModule,
    nn::{
        attention::{MhaInput, MultiHeadAttention, MultiHeadAttentionConfig},
        Embedding, EmbeddingConfig,
        LayerNorm, LayerNormConfig,
        Linear, LinearConfig,
    },
    prelude::*,
    tensor::{backend::AutodiffBackend, Distribution},
};

#[derive(Config, Debug)]
pub struct MaskedAutoencoderConfig {
    /// Grid image height in pixels
    pub img_height: usize,
    /// Grid image width in pixels
    pub img_width:  usize,
    pub patch_size: usize,
    pub in_chans:   usize,
    #[config(default = 192)]
    pub embed_dim: usize,
    #[config(default = 12)]
    pub depth: usize,
    #[config(default = 3)]
    pub num_heads: usize,
    #[config(default = 128)]
    pub decoder_embed_dim: usize,
    #[config(default = 4)]
    pub decoder_depth: usize,
    #[config(default = 4)]
    pub decoder_num_heads: usize,
    #[config(default = 4)]
    pub mlp_ratio: usize,
    #[config(default = false)]
    pub norm_pix_loss: bool,
}

impl MaskedAutoencoderConfig {
    pub fn patches_h(&self) -> usize { self.img_height / self.patch_size }
    pub fn patches_w(&self) -> usize { self.img_width / self.patch_size }
    pub fn num_patches(&self) -> usize { self.patches_h() * self.patches_w() }
    pub fn patch_dim(&self) -> usize { self.patch_size * self.patch_size * self.in_chans }

    pub fn init<B: Backend>(&self, device: &B::Device) -> MaskedAutoencoder<B> {
        let num_patches = self.num_patches();
        let patch_dim = self.patch_dim();

        let blocks = (0..self.depth)
            .map(|_| self.build_block(self.embed_dim, self.num_heads, device))
            .collect();
        let decoder_blocks = (0..self.decoder_depth)
            .map(|_| self.build_block(self.decoder_embed_dim, self.decoder_num_heads, device))
            .collect();

        MaskedAutoencoder {
            patch_embed:       LinearConfig::new(patch_dim, self.embed_dim).init(device),
            pos_embed:         EmbeddingConfig::new(num_patches, self.embed_dim).init(device),
            blocks,
            norm:              LayerNormConfig::new(self.embed_dim).init(device),
            decoder_embed:     LinearConfig::new(self.embed_dim, self.decoder_embed_dim).init(device),
            mask_token:        EmbeddingConfig::new(1, self.decoder_embed_dim).init(device),
            decoder_pos_embed: EmbeddingConfig::new(num_patches, self.decoder_embed_dim).init(device),
            decoder_blocks,
            decoder_norm:      LayerNormConfig::new(self.decoder_embed_dim).init(device),
            decoder_pred:      LinearConfig::new(self.decoder_embed_dim, patch_dim).init(device),
            patch_size:        self.patch_size,
            patches_h:         self.patches_h(),
            patches_w:         self.patches_w(),
            in_chans:          self.in_chans,
            norm_pix_loss:     self.norm_pix_loss,
        }
    }

    fn build_block<B: Backend>(&self, dim: usize, heads: usize, device: &B::Device) -> Block<B> {
        Block {
            norm1: LayerNormConfig::new(dim).init(device),
            attn:  MultiHeadAttentionConfig::new(dim, heads).with_dropout(0.0).init(device),
            norm2: LayerNormConfig::new(dim).init(device),
            fc1:   LinearConfig::new(dim, dim * self.mlp_ratio).init(device),
            fc2:   LinearConfig::new(dim * self.mlp_ratio, dim).init(device),
        }
    }
}

/// Pre-norm transformer block: x + attn(norm(x)), then x + mlp(norm(x))
#[derive(Module, Debug)]
pub struct Block<B: Backend> {
    pub norm1: LayerNorm<B>,
    pub attn:  MultiHeadAttention<B>,
    pub norm2: LayerNorm<B>,
    pub fc1:   Linear<B>,
    pub fc2:   Linear<B>,
}

impl<B: Backend> Block<B> {
    pub fn forward(&self, x: Tensor<B, 3>) -> Tensor<B, 3> {
        let h = self.norm1.forward(x.clone());
        let x = x + self.attn.forward(MhaInput::self_attn(h)).context;
        let h = self.fc2.forward(
            burn::tensor::activation::gelu(self.fc1.forward(self.norm2.forward(x.clone())))
        );
        x + h
    }
}

#[derive(Module, Debug)]
pub struct MaskedAutoencoder<B: Backend> {
    pub patch_embed:       Linear<B>,
    pub pos_embed:         Embedding<B>,
    pub blocks:            Vec<Block<B>>,
    pub norm:              LayerNorm<B>,
    pub decoder_embed:     Linear<B>,
    /// Single learned row, looked up once per masked patch
    pub mask_token:        Embedding<B>,
    pub decoder_pos_embed: Embedding<B>,
    pub decoder_blocks:    Vec<Block<B>>,
    pub decoder_norm:      LayerNorm<B>,
    pub decoder_pred:      Linear<B>,
    pub patch_size:        usize,
    pub patches_h:         usize,
    pub patches_w:         usize,
    pub in_chans:          usize,
    pub norm_pix_loss:     bool,
}

/// What one forward pass produces
#[derive(Debug, Clone)]
pub struct MaeOutput<B: Backend> {
    /// Scalar, shape [1]
    pub loss: Tensor<B, 1>,
    /// [batch, patches, patch² · channels]
    pub pred: Tensor<B, 3>,
    /// [batch, patches]; 1 = masked, 0 = visible
    pub mask: Tensor<B, 2>,
}

impl<B: Backend> MaskedAutoencoder<B> {
    /// imgs: [B, C, H, W] → [B, L, p²·C]
    pub fn patchify(&self, imgs: Tensor<B, 4>) -> Tensor<B, 3> {
        let [batch, chans, _, _] = imgs.dims();
        let (p, h, w) = (self.patch_size, self.patches_h, self.patches_w);
        imgs.reshape([batch, chans, h, p, w, p])
            .permute([0, 2, 4, 3, 5, 1])
            .reshape([batch, h * w, p * p * chans])
    }

    /// x: [B, L, p²·C] → [B, C, H, W]
    pub fn unpatchify(&self, x: Tensor<B, 3>) -> Tensor<B, 4> {
        let [batch, _, _] = x.dims();
        let (p, h, w, c) = (self.patch_size, self.patches_h, self.patches_w, self.in_chans);
        x.reshape([batch, h, w, p, p, c])
            .permute([0, 5, 1, 3, 2, 4])
            .reshape([batch, c, h * p, w * p])
    }

    fn positions(&self, batch: usize, len: usize, device: &B::Device) -> Tensor<B, 2, Int> {
        Tensor::<B, 1, Int>::arange(0..len as i64, device)
            .unsqueeze::<2>()
            .expand([batch, len])
    }

    /// Per-sample shuffle by argsort of uniform noise; keeps the
    /// first `len_keep` shuffled patches. At least one patch always
    /// stays visible, so a ratio of 1.0 masks `L - 1` patches.
    ///
    /// Returns (kept tokens, mask [B, L], ids_restore [B, L]).
    pub fn random_masking(
        &self,
        x:          Tensor<B, 3>,
        mask_ratio: f64,
    ) -> (Tensor<B, 3>, Tensor<B, 2>, Tensor<B, 2, Int>) {
        let [batch, len, dim] = x.dims();
        let len_keep = keep_count(len, mask_ratio);
        let device = x.device();

        let noise = Tensor::<B, 2>::random([batch, len], Distribution::Uniform(0.0, 1.0), &device);
        let ids_shuffle = noise.argsort(1);
        let ids_restore = ids_shuffle.clone().argsort(1);

        let ids_keep = ids_shuffle.slice([0..batch, 0..len_keep]);
        let x_masked = x.gather(1, ids_keep.unsqueeze_dim::<3>(2).expand([batch, len_keep, dim]));

        // a patch is masked iff its rank in the shuffle is past len_keep
        let mask = ids_restore
            .clone()
            .greater_equal_elem(len_keep as i64)
            .float();

        (x_masked, mask, ids_restore)
    }

    pub fn forward_encoder(
        &self,
        imgs:       Tensor<B, 4>,
        mask_ratio: f64,
    ) -> (Tensor<B, 3>, Tensor<B, 2>, Tensor<B, 2, Int>) {
        let x = self.patch_embed.forward(self.patchify(imgs));
        let [batch, len, _] = x.dims();
        let device = x.device();
        let x = x + self.pos_embed.forward(self.positions(batch, len, &device));

        let (mut x, mask, ids_restore) = self.random_masking(x, mask_ratio);
        for block in &self.blocks {
            x = block.forward(x);
        }
        (self.norm.forward(x), mask, ids_restore)
    }

    pub fn forward_decoder(&self, x: Tensor<B, 3>, ids_restore: Tensor<B, 2, Int>) -> Tensor<B, 3> {
        let x = self.decoder_embed.forward(x);
        let [batch, kept, dim] = x.dims();
        let len = ids_restore.dims()[1];
        let device = x.device();

        // append mask tokens, then undo the shuffle
        let x = if kept < len {
            let ids = Tensor::<B, 2, Int>::zeros([batch, len - kept], &device);
            Tensor::cat(vec![x, self.mask_token.forward(ids)], 1)
        } else {
            x
        };
        let x = x.gather(1, ids_restore.unsqueeze_dim::<3>(2).expand([batch, len, dim]));
        let mut x = x + self.decoder_pos_embed.forward(self.positions(batch, len, &device));

        for block in &self.decoder_blocks {
            x = block.forward(x);
        }
        self.decoder_pred.forward(self.decoder_norm.forward(x))
    }

    /// Mean squared error over masked patches only.
    pub fn forward_loss(
        &self,
        imgs: Tensor<B, 4>,
        pred: Tensor<B, 3>,
        mask: Tensor<B, 2>,
    ) -> Tensor<B, 1> {
        let target = self.patchify(imgs);
        let target = if self.norm_pix_loss {
            let mean = target.clone().mean_dim(2);
            let var = target.clone().var(2);
            (target - mean) / var.add_scalar(1e-6).sqrt()
        } else {
            target
        };

        let per_patch = (pred - target).powf_scalar(2.0).mean_dim(2).squeeze::<2>(2);
        // clamp keeps mask_ratio = 0 from dividing by zero
        (per_patch * mask.clone()).sum() / mask.sum().clamp_min(1.0)
    }

    /// imgs: [B, C, H, W] → loss, per-patch prediction, mask
    pub fn forward(&self, imgs: Tensor<B, 4>, mask_ratio: f64) -> MaeOutput<B> {
        let (latent, mask, ids_restore) = self.forward_encoder(imgs.clone(), mask_ratio);
        let pred = self.forward_decoder(latent, ids_restore);
        let loss = self.forward_loss(imgs, pred.clone(), mask.clone());
        MaeOutput { loss, pred, mask }
    }
}

/// What the epoch loop needs from a model.
pub trait MaskedImageModel<B: AutodiffBackend>: AutodiffModule<B> {
    fn forward_mae(&self, images: Tensor<B, 4>, mask_ratio: f64) -> MaeOutput<B>;

    fn unpatchify(&self, pred: Tensor<B, 3>) -> Tensor<B, 4>;
}

impl<B: AutodiffBackend> MaskedImageModel<B> for MaskedAutoencoder<B> {
    fn forward_mae(&self, images: Tensor<B, 4>, mask_ratio: f64) -> MaeOutput<B> {
        self.forward(images, mask_ratio)
    }

    fn unpatchify(&self, pred: Tensor<B, 3>) -> Tensor<B, 4> {
        MaskedAutoencoder::unpatchify(self, pred)
    }
}

/// `floor(len · (1 - mask_ratio))`, never below one visible patch
pub fn keep_count(len: usize, mask_ratio: f64) -> usize {
    (((len as f64) * (1.0 - mask_ratio)) as usize).clamp(1, len.max(1))
}

// ─── Unit Tests ───────────────────────────────────────────────────────────────
#[cfg(test)]
mod tests {
    use super::*;
    use burn::backend::NdArray;

    type TestBackend = NdArray<f32>;

    fn tiny() -> MaskedAutoencoderConfig {
        MaskedAutoencoderConfig::new(8, 12, 4, 3)
            .with_embed_dim(8)
            .with_depth(1)
            .with_num_heads(2)
            .with_decoder_embed_dim(8)
            .with_decoder_depth(1)
            .with_decoder_num_heads(2)
    }

    fn values<const D: usize>(t: Tensor<TestBackend, D>) -> Vec<f32> {
        t.into_data().convert::<f32>().to_vec::<f32>().unwrap()
    }

    #[test]
    fn test_patch_counts() {
        let cfg = tiny();
        assert_eq!(cfg.num_patches(), 6);
        assert_eq!(cfg.patch_dim(), 48);
    }

    #[test]
    fn test_unpatchify_inverts_patchify() {
        let device = Default::default();
        let model = tiny().init::<TestBackend>(&device);
        let imgs = Tensor::<TestBackend, 4>::random([2, 3, 8, 12], Distribution::Default, &device);
        let patches = model.patchify(imgs.clone());
        assert_eq!(patches.dims(), [2, 6, 48]);
        assert_eq!(values(model.unpatchify(patches)), values(imgs));
    }

    #[test]
    fn test_patch_holds_its_pixels_channel_last() {
        let device = Default::default();
        let model = tiny().init::<TestBackend>(&device);
        let imgs = Tensor::<TestBackend, 1, Int>::arange(0..(3 * 8 * 12) as i64, &device)
            .float()
            .reshape([1, 3, 8, 12]);
        let patches = values(model.patchify(imgs));
        // patch 1 is row 0, col 1 → pixel (y=0, x=4); element 0 is channel 0
        assert_eq!(patches[48], 4.0);
        // element 1 is channel 1 of the same pixel
        assert_eq!(patches[49], (8 * 12 + 4) as f32);
    }

    #[test]
    fn test_masking_keeps_expected_count() {
        let device = Default::default();
        let model = tiny().init::<TestBackend>(&device);
        let x = Tensor::<TestBackend, 3>::random([3, 6, 8], Distribution::Default, &device);
        let (kept, mask, ids_restore) = model.random_masking(x, 0.5);

        assert_eq!(kept.dims(), [3, 3, 8]);
        assert_eq!(ids_restore.dims(), [3, 6]);
        let mask = values(mask);
        for row in mask.chunks(6) {
            assert_eq!(row.iter().sum::<f32>(), 3.0);
        }
    }

    #[test]
    fn test_keep_count_leaves_one_visible_patch() {
        assert_eq!(keep_count(64, 0.75), 16);
        assert_eq!(keep_count(64, 0.99), 1);
        assert_eq!(keep_count(6, 0.9), 1);
        assert_eq!(keep_count(6, 1.0), 1);
        assert_eq!(keep_count(6, 0.0), 6);
    }

    #[test]
    fn test_near_full_mask_ratio_runs() {
        let device = Default::default();
        let model = tiny().init::<TestBackend>(&device);
        let imgs = Tensor::<TestBackend, 4>::random([2, 3, 8, 12], Distribution::Default, &device);
        for ratio in [0.9, 1.0] {
            let out = model.forward(imgs.clone(), ratio);
            assert_eq!(out.pred.dims(), [2, 6, 48]);
            for row in values(out.mask).chunks(6) {
                assert_eq!(row.iter().sum::<f32>(), 5.0);
            }
            assert!(out.loss.into_scalar().elem::<f64>().is_finite());
        }
    }

    #[test]
    fn test_forward_shapes_and_finite_loss() {
        let device = Default::default();
        let model = tiny().with_norm_pix_loss(true).init::<TestBackend>(&device);
        let imgs = Tensor::<TestBackend, 4>::random([2, 3, 8, 12], Distribution::Default, &device);
        let out = model.forward(imgs, 0.75);

        assert_eq!(out.pred.dims(), [2, 6, 48]);
        assert_eq!(out.mask.dims(), [2, 6]);
        let loss = out.loss.into_scalar().elem::<f64>();
        assert!(loss.is_finite() && loss >= 0.0);
    }

    #[test]
    fn test_zero_mask_ratio_gives_zero_masked_loss() {
        let device = Default::default();
        let model = tiny().init::<TestBackend>(&device);
        let imgs = Tensor::<TestBackend, 4>::random([1, 3, 8, 12], Distribution::Default, &device);
        let out = model.forward(imgs, 0.0);
        assert_eq!(values(out.mask).iter().sum::<f32>(), 0.0);
        assert_eq!(out.loss.into_scalar().elem::<f64>(), 0.0);
    }
}
